use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::abi::{AbiFetcher, FetchError};

type SharedFetch = Shared<BoxFuture<'static, Result<String, FetchError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    chain_id: u64,
    address: String,
}

impl CacheKey {
    fn new(chain_id: u64, address: &str) -> Self {
        Self {
            chain_id,
            address: address.trim().to_lowercase(),
        }
    }
}

struct CacheEntry {
    abi: String,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    // Weak handles so that a fetch nobody waits on any more is dropped.
    in_flight: HashMap<CacheKey, WeakShared<BoxFuture<'static, Result<String, FetchError>>>>,
}

impl CacheState {
    fn fresh(&mut self, key: &CacheKey, ttl: Duration) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < ttl => Some(entry.abi.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&mut self, key: CacheKey, abi: String, ttl: Duration, capacity: usize) {
        if capacity == 0 {
            return;
        }

        if self.entries.len() >= capacity && !self.entries.contains_key(&key) {
            self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        }

        while self.entries.len() >= capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                abi,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// Read-through TTL cache in front of another [`AbiFetcher`].
///
/// Concurrent misses for the same `(chain_id, address)` share a single
/// call to the inner fetcher. Failures are never cached.
pub struct CachedAbiFetcher<F> {
    inner: Arc<F>,
    ttl: Duration,
    capacity: usize,
    state: Arc<Mutex<CacheState>>,
}

impl<F: AbiFetcher + 'static> CachedAbiFetcher<F> {
    pub fn new(inner: F, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            ttl,
            capacity,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    fn start_fetch(&self, key: CacheKey, address: &str, chain_id: u64) -> SharedFetch {
        let inner = self.inner.clone();
        let state = self.state.clone();
        let address = address.to_string();
        let (ttl, capacity) = (self.ttl, self.capacity);

        async move {
            let result = inner.fetch(&address, chain_id).await;
            let mut guard = lock(&state);
            guard.in_flight.remove(&key);
            if let Ok(abi) = &result {
                guard.insert(key, abi.clone(), ttl, capacity);
            }
            result
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl<F: AbiFetcher + 'static> AbiFetcher for CachedAbiFetcher<F> {
    async fn fetch(&self, address: &str, chain_id: u64) -> Result<String, FetchError> {
        let key = CacheKey::new(chain_id, address);

        let pending = {
            let mut state = lock(&self.state);

            if let Some(abi) = state.fresh(&key, self.ttl) {
                debug!("ABI cache hit for {} on chain {}", key.address, chain_id);
                return Ok(abi);
            }

            let joined = state.in_flight.get(&key).and_then(WeakShared::upgrade);
            match joined {
                Some(pending) => {
                    debug!("Joining in-flight ABI fetch for {}", key.address);
                    pending
                }
                None => {
                    debug!("ABI cache miss for {} on chain {}", key.address, chain_id);
                    // Fetches abandoned by every waiter never complete, so drop their handles here.
                    state.in_flight.retain(|_, weak| weak.upgrade().is_some());
                    let pending = self.start_fetch(key.clone(), address, chain_id);
                    if let Some(weak) = pending.downgrade() {
                        state.in_flight.insert(key, weak);
                    }
                    pending
                }
            }
        };

        pending.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubFetcher;

    const ADDRESS: &str = "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984";

    fn cached<F: AbiFetcher + 'static>(cache: &CachedAbiFetcher<F>) -> usize {
        lock(&cache.state).entries.len()
    }

    fn in_flight<F: AbiFetcher + 'static>(cache: &CachedAbiFetcher<F>) -> usize {
        lock(&cache.state).in_flight.len()
    }

    #[tokio::test]
    async fn test_concurrent_fetches_coalesce() {
        let stub = StubFetcher::new(Ok("[]".to_string())).with_delay(Duration::from_millis(50));
        let calls = stub.calls();
        let cache = Arc::new(CachedAbiFetcher::new(stub, Duration::from_secs(60), 16));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.fetch(ADDRESS, 1).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), "[]");
        }
        assert_eq!(calls.get(), 1);

        // Served from cache, and the key ignores address casing.
        let lowered = ADDRESS.to_lowercase();
        assert_eq!(cache.fetch(&lowered, 1).await.unwrap(), "[]");
        assert_eq!(calls.get(), 1);
        assert_eq!(cached(&cache), 1);
    }

    #[tokio::test]
    async fn test_keys_are_per_chain() {
        let stub = StubFetcher::new(Ok("[]".to_string()));
        let calls = stub.calls();
        let cache = CachedAbiFetcher::new(stub, Duration::from_secs(60), 16);

        cache.fetch(ADDRESS, 1).await.unwrap();
        cache.fetch(ADDRESS, 137).await.unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let stub = StubFetcher::new(Ok("[]".to_string()));
        let calls = stub.calls();
        let cache = CachedAbiFetcher::new(stub, Duration::ZERO, 16);

        cache.fetch(ADDRESS, 1).await.unwrap();
        cache.fetch(ADDRESS, 1).await.unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let stub = StubFetcher::new(Err(FetchError::NetworkError("boom".to_string())));
        let calls = stub.calls();
        let cache = CachedAbiFetcher::new(stub, Duration::from_secs(60), 16);

        assert!(cache.fetch(ADDRESS, 1).await.is_err());
        assert!(cache.fetch(ADDRESS, 1).await.is_err());
        assert_eq!(calls.get(), 2);
        assert_eq!(cached(&cache), 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let stub = StubFetcher::new(Ok("[]".to_string()));
        let calls = stub.calls();
        let cache = CachedAbiFetcher::new(stub, Duration::from_secs(60), 2);

        let a = "0x0000000000000000000000000000000000000001";
        let b = "0x0000000000000000000000000000000000000002";
        let c = "0x0000000000000000000000000000000000000003";

        cache.fetch(a, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.fetch(b, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.fetch(c, 1).await.unwrap();
        assert_eq!(cached(&cache), 2);
        assert_eq!(calls.get(), 3);

        cache.fetch(c, 1).await.unwrap();
        assert_eq!(calls.get(), 3);
        cache.fetch(a, 1).await.unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_abandoned_fetch_is_dropped() {
        let stub = StubFetcher::new(Ok("[]".to_string())).with_delay(Duration::from_millis(200));
        let calls = stub.calls();
        let cache = CachedAbiFetcher::new(stub, Duration::from_secs(60), 16);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), cache.fetch(ADDRESS, 1)).await;
        assert!(abandoned.is_err());

        // The first fetch was dropped with its only waiter, so a new one starts.
        assert_eq!(cache.fetch(ADDRESS, 1).await.unwrap(), "[]");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_fetches_do_not_accumulate() {
        let stub = StubFetcher::new(Ok("[]".to_string())).with_delay(Duration::from_millis(200));
        let cache = CachedAbiFetcher::new(stub, Duration::from_secs(60), 64);

        for i in 1..=50u64 {
            let address = format!("0x{:040x}", i);
            let abandoned =
                tokio::time::timeout(Duration::from_millis(1), cache.fetch(&address, 1)).await;
            assert!(abandoned.is_err());
        }

        // Only the most recent dead handle is left.
        assert_eq!(in_flight(&cache), 1);

        cache.fetch(ADDRESS, 1).await.unwrap();

        assert_eq!(in_flight(&cache), 0);
        assert_eq!(cached(&cache), 1);
    }
}
