//! Deduplicates concurrent origin fetches for the same URL: the first
//! caller runs `fetch`, everyone else observes the same `Shared` future.
//! Has no direct teacher analog; built from the `Arc<Mutex<HashMap<_, _>>>`
//! shape the teacher uses for its own registries.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type FetchResult<E> = Result<Arc<Vec<u8>>, Arc<E>>;
type InFlight<E> = Shared<BoxFuture<'static, FetchResult<E>>>;

pub struct SingleFlight<E> {
    inflight: Mutex<HashMap<String, InFlight<E>>>,
}

impl<E: Send + Sync + 'static> Default for SingleFlight<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + Sync + 'static> SingleFlight<E> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fetch` for `key` unless a fetch for the same key is already in
    /// flight, in which case this call subscribes to that one instead.
    /// Guarantees at most one concurrent upstream request per key.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> FetchResult<E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>, E>> + Send + 'static,
    {
        let mut guard = self.inflight.lock().await;
        if let Some(existing) = guard.get(key) {
            let shared = existing.clone();
            drop(guard);
            return shared.await;
        }
        let boxed: BoxFuture<'static, FetchResult<E>> = async move { fetch().await.map(Arc::new).map_err(Arc::new) }.boxed();
        let shared = boxed.shared();
        guard.insert(key.to_string(), shared.clone());
        drop(guard);

        let result = shared.await;
        self.inflight.lock().await.remove(key);
        result
    }
}
