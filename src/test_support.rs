use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::ethereum::abi::{AbiFetcher, FetchError};

#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetcher returning a canned response and counting invocations.
#[derive(Debug)]
pub struct StubFetcher {
    response: Result<String, FetchError>,
    delay: Option<Duration>,
    calls: CallCounter,
}

impl StubFetcher {
    pub fn new(response: Result<String, FetchError>) -> Self {
        Self {
            response,
            delay: None,
            calls: CallCounter::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

#[async_trait]
impl AbiFetcher for StubFetcher {
    async fn fetch(&self, _address: &str, _chain_id: u64) -> Result<String, FetchError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

pub const TWO_ENTRY_ABI: &str = r#"[
    {"type":"function","name":"transfer","inputs":[{"name":"dst","type":"address"},{"name":"rawAmount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
    {"type":"event","name":"Transfer","inputs":[{"name":"from","type":"address","indexed":true},{"name":"to","type":"address","indexed":true},{"name":"amount","type":"uint256","indexed":false}],"anonymous":false}
]"#;
