use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::utils;
use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidAddress(String),

    #[error("Chain {0} is not supported")]
    UnsupportedChain(u64),

    #[error("ABI unavailable: {0}")]
    AbiUnavailable(String),

    #[error("Explorer rate limit still exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Source of raw contract ABIs.
#[async_trait]
pub trait AbiFetcher: Send + Sync {
    async fn fetch(&self, address: &str, chain_id: u64) -> Result<String, FetchError>;
}

/// Block explorer API endpoint for one chain.
#[derive(Debug, Clone)]
pub struct ExplorerEndpoint {
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_rate_limit_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_rate_limit_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

/// Outcome of a single explorer round trip that did not yield an ABI.
#[derive(Debug)]
enum AttemptError {
    RateLimited,
    Transport(String),
    Fatal(FetchError),
}

/// Fetches verified contract ABIs from Etherscan-compatible explorer APIs.
#[derive(Debug)]
pub struct EtherscanFetcher {
    client: Client,
    endpoints: HashMap<u64, ExplorerEndpoint>,
    policy: FetchPolicy,
}

impl EtherscanFetcher {
    pub fn new(
        endpoints: HashMap<u64, ExplorerEndpoint>,
        policy: FetchPolicy,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoints,
            policy,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.explorer_endpoints(), config.fetcher.policy())
    }

    pub fn supported_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.endpoints.keys().copied().collect();
        chains.sort_unstable();
        chains
    }

    async fn request_abi(
        &self,
        endpoint: &ExplorerEndpoint,
        api_key: &str,
        address: &str,
        chain_id: u64,
    ) -> Result<String, AttemptError> {
        let chain_id = chain_id.to_string();
        let response = self
            .client
            .get(&endpoint.api_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address),
                ("apikey", api_key),
            ])
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(FetchError::NetworkError(format!(
                "Explorer returned HTTP {}",
                status
            ))));
        }

        // A connection lost mid-body is a transport failure like one lost before the headers.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let body: ExplorerResponse = serde_json::from_slice(&bytes).map_err(|e| {
            AttemptError::Fatal(FetchError::NetworkError(format!(
                "Failed to parse explorer response: {}",
                e
            )))
        })?;

        interpret_response(body)
    }
}

/// Maps an explorer JSON body onto an ABI or a classified failure.
fn interpret_response(body: ExplorerResponse) -> Result<String, AttemptError> {
    let result = body.result.as_str().unwrap_or_default();

    if body.status == "1" {
        if result.is_empty() {
            return Err(AttemptError::Fatal(FetchError::AbiUnavailable(
                "Explorer returned an empty ABI".to_string(),
            )));
        }
        return Ok(result.to_string());
    }

    let detail = if result.is_empty() {
        body.message.clone()
    } else {
        result.to_string()
    };
    let lowered = detail.to_lowercase();

    if lowered.contains("rate limit") {
        return Err(AttemptError::RateLimited);
    }

    if lowered.contains("not verified") {
        return Err(AttemptError::Fatal(FetchError::AbiUnavailable(
            "Contract source code is not verified".to_string(),
        )));
    }

    Err(AttemptError::Fatal(FetchError::AbiUnavailable(format!(
        "Explorer API error: {}",
        detail
    ))))
}

#[async_trait]
impl AbiFetcher for EtherscanFetcher {
    async fn fetch(&self, address: &str, chain_id: u64) -> Result<String, FetchError> {
        let address = utils::validate_address(address)?;
        let address = format!("0x{}", hex::encode(address.as_slice()));

        let endpoint = self
            .endpoints
            .get(&chain_id)
            .ok_or(FetchError::UnsupportedChain(chain_id))?;

        let api_key = endpoint
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                FetchError::AbiUnavailable(format!(
                    "No explorer API key configured for chain {}",
                    chain_id
                ))
            })?;

        info!("Fetching ABI for {} on chain {}", address, chain_id);

        let mut rate_limited = 0u32;
        let mut transport_failures = 0u32;

        loop {
            match self.request_abi(endpoint, api_key, &address, chain_id).await {
                Ok(abi) => {
                    debug!("Fetched ABI for {} ({} bytes)", address, abi.len());
                    return Ok(abi);
                }
                Err(AttemptError::RateLimited) => {
                    rate_limited += 1;
                    if rate_limited >= self.policy.max_rate_limit_attempts {
                        return Err(FetchError::RateLimited {
                            attempts: rate_limited,
                        });
                    }
                    let delay = self.policy.backoff_base * 2u32.saturating_pow(rate_limited - 1);
                    warn!(
                        "Explorer rate limited ABI request for {}, retrying in {:?}",
                        address, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transport(e)) => {
                    transport_failures += 1;
                    if transport_failures > 1 {
                        return Err(FetchError::NetworkError(e));
                    }
                    warn!("Explorer request for {} failed, retrying once: {}", address, e);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }
    }
}
