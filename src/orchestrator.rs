use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::descriptor::{synthesize, Descriptor};
use crate::ethereum::abi::{AbiFetcher, FetchError};
use crate::ethereum::parser::{parse, ParseError};
use crate::ethereum::utils;

/// Body of a generate request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub abi: Option<String>,
    pub address: Option<String>,
    pub chain_id: Option<u64>,
}

/// Failure categories surfaced to clients. Each maps to one HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid ABI: {0}")]
    InvalidAbi(#[from] ParseError),

    #[error("{0}")]
    InvalidAddress(String),

    #[error("Chain {0} is not supported")]
    UnsupportedChain(u64),

    #[error("{0}")]
    AbiUnavailable(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    NetworkError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::InvalidAbi(_) => "InvalidAbi",
            ApiError::InvalidAddress(_) => "InvalidAddress",
            ApiError::UnsupportedChain(_) => "UnsupportedChain",
            ApiError::AbiUnavailable(_) => "AbiUnavailable",
            ApiError::RateLimited(_) => "RateLimited",
            ApiError::NetworkError(_) => "NetworkError",
            ApiError::Internal(_) => "Internal",
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        let message = error.to_string();
        match error {
            FetchError::InvalidAddress(_) => ApiError::InvalidAddress(message),
            FetchError::UnsupportedChain(chain_id) => ApiError::UnsupportedChain(chain_id),
            FetchError::AbiUnavailable(_) => ApiError::AbiUnavailable(message),
            FetchError::RateLimited { .. } => ApiError::RateLimited(message),
            FetchError::NetworkError(_) => ApiError::NetworkError(message),
        }
    }
}

/// Where the ABI for a validated request comes from.
enum AbiOrigin {
    Inline(String),
    OnChain { address: Address, chain_id: u64 },
}

/// Drives one request through validate -> acquire -> parse -> synthesize.
pub struct Orchestrator {
    fetcher: Arc<dyn AbiFetcher>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn AbiFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<Descriptor, ApiError> {
        let origin = Self::validate(request)?;

        let raw_abi = match &origin {
            AbiOrigin::Inline(abi) => {
                debug!("Request validated: inline ABI ({} bytes)", abi.len());
                abi.clone()
            }
            AbiOrigin::OnChain { address, chain_id } => {
                debug!("Request validated: {} on chain {}", address, chain_id);
                self.fetcher.fetch(&address.to_string(), *chain_id).await?
            }
        };
        debug!("ABI acquired ({} bytes)", raw_abi.len());

        let model = parse(&raw_abi)?;
        if model.is_empty() {
            warn!("ABI has no functions or events, descriptor will be empty");
        }
        debug!(
            "ABI parsed: {} functions, {} events",
            model.functions.len(),
            model.events.len()
        );

        let descriptor = match origin {
            AbiOrigin::Inline(_) => synthesize(&model),
            AbiOrigin::OnChain { address, chain_id } => {
                synthesize(&model).with_deployment(chain_id, address)
            }
        };
        info!(
            "Generated descriptor '{}' with {} entries",
            descriptor.name(),
            descriptor.entry_count()
        );
        debug!(
            "{} ({} formats, {} events)",
            descriptor.description(),
            descriptor.functions().len(),
            descriptor.events().len()
        );

        Ok(descriptor)
    }

    fn validate(request: GenerateRequest) -> Result<AbiOrigin, ApiError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let abi = non_empty(request.abi);
        let address = non_empty(request.address);

        match (abi, address) {
            (Some(abi), None) => Ok(AbiOrigin::Inline(abi)),
            (None, Some(address)) => {
                let address = utils::validate_address(&address)?;
                Ok(AbiOrigin::OnChain {
                    address,
                    chain_id: utils::resolve_chain_id(request.chain_id),
                })
            }
            (Some(_), Some(_)) => Err(ApiError::InvalidInput(
                "Provide either an ABI or an address, not both".to_string(),
            )),
            (None, None) => Err(ApiError::InvalidInput(
                "No ABI or address provided".to_string(),
            )),
        }
    }
}
