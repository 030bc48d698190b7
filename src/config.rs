use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::ethereum::abi::{ExplorerEndpoint, FetchPolicy};

const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";
const ETHERSCAN_V2_API: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub fetcher: FetcherConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: u64,
    pub max_rate_limit_attempts: u32,
    pub backoff_base_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub api_url: String,
    pub api_key: Option<String>,
    pub explorer_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_rate_limit_attempts: 3,
            backoff_base_ms: 500,
            cache_ttl_secs: 300,
            cache_capacity: 1024,
        }
    }
}

impl FetcherConfig {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_rate_limit_attempts: self.max_rate_limit_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut chains = HashMap::new();

        for (name, chain_id, explorer_url) in [
            ("ethereum", 1, "https://etherscan.io"),
            ("sepolia", 11155111, "https://sepolia.etherscan.io"),
            ("holesky", 17000, "https://holesky.etherscan.io"),
            ("polygon", 137, "https://polygonscan.com"),
            ("arbitrum", 42161, "https://arbiscan.io"),
            ("optimism", 10, "https://optimistic.etherscan.io"),
            ("base", 8453, "https://basescan.org"),
        ] {
            chains.insert(
                name.to_string(),
                ChainConfig {
                    chain_id,
                    api_url: ETHERSCAN_V2_API.to_string(),
                    api_key: None,
                    explorer_url: Some(explorer_url.to_string()),
                },
            );
        }

        Self {
            server: ServerConfig::default(),
            fetcher: FetcherConfig::default(),
            chains,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Apply environment overrides: `ETHERSCAN_API_KEY`, `HOST`, `PORT`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup("ETHERSCAN_API_KEY").filter(|key| !key.is_empty()) {
            Some(api_key) => {
                tracing::info!("Using ETHERSCAN_API_KEY environment variable for ABI lookups");
                for (name, chain) in &mut self.chains {
                    let missing = match chain.api_key.as_deref() {
                        None => true,
                        Some(key) => key.is_empty() || key == API_KEY_PLACEHOLDER,
                    };
                    if missing {
                        chain.api_key = Some(api_key.clone());
                        tracing::debug!("Applied explorer API key to chain {}", name);
                    }
                }
            }
            None => {
                let keyless: Vec<&str> = self
                    .chains
                    .iter()
                    .filter(|(_, chain)| {
                        chain
                            .api_key
                            .as_deref()
                            .map_or(true, |key| key.is_empty() || key == API_KEY_PLACEHOLDER)
                    })
                    .map(|(name, _)| name.as_str())
                    .collect();
                if !keyless.is_empty() {
                    tracing::warn!(
                        "ETHERSCAN_API_KEY not set; address lookups will fail for: {}",
                        keyless.join(", ")
                    );
                }
            }
        }

        if let Some(host) = lookup("HOST").filter(|host| !host.is_empty()) {
            self.server.host = host;
        }

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!("Ignoring invalid PORT '{}': {}", port, e),
            }
        }
    }

    /// Explorer endpoints keyed by chain id.
    pub fn explorer_endpoints(&self) -> HashMap<u64, ExplorerEndpoint> {
        let mut names: Vec<&String> = self.chains.keys().collect();
        names.sort();

        let mut endpoints = HashMap::new();
        for name in names {
            let chain = &self.chains[name];
            let api_key = chain
                .api_key
                .clone()
                .filter(|key| !key.is_empty() && key != API_KEY_PLACEHOLDER);
            let endpoint = ExplorerEndpoint {
                api_url: chain.api_url.clone(),
                api_key,
            };
            if endpoints.insert(chain.chain_id, endpoint).is_some() {
                tracing::warn!(
                    "Chain id {} configured more than once, using '{}'",
                    chain.chain_id,
                    name
                );
            }
        }
        endpoints
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("erc7730-api").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# ERC7730 API Configuration File
# This file configures the HTTP listener, explorer access and chain support

[server]
host = "0.0.0.0"
port = 8080

# Explorer requests and ABI cache
[fetcher]
timeout_secs = 10
max_rate_limit_attempts = 3
backoff_base_ms = 500
cache_ttl_secs = 300
cache_capacity = 1024

# Supported chains. Every entry uses the Etherscan v2 multichain endpoint;
# any Etherscan-compatible API can be used instead.
[chains.ethereum]
chain_id = 1
api_url = "https://api.etherscan.io/v2/api"
api_key = "YOUR_API_KEY_HERE"
explorer_url = "https://etherscan.io"

[chains.sepolia]
chain_id = 11155111
api_url = "https://api.etherscan.io/v2/api"
api_key = "YOUR_API_KEY_HERE"
explorer_url = "https://sepolia.etherscan.io"

[chains.polygon]
chain_id = 137
api_url = "https://api.etherscan.io/v2/api"
api_key = "YOUR_API_KEY_HERE"
explorer_url = "https://polygonscan.com"

[chains.arbitrum]
chain_id = 42161
api_url = "https://api.etherscan.io/v2/api"
api_key = "YOUR_API_KEY_HERE"
explorer_url = "https://arbiscan.io"

# Environment variables that can be used:
# ETHERSCAN_API_KEY - Etherscan API key, replaces YOUR_API_KEY_HERE above
# HOST - Listening address
# PORT - Listening port
"#;
        sample_config.to_string()
    }
}
