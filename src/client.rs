use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::backend::{SearchHit, VectorBackend};
use crate::error::{Error, RemoteOp, Result};
use crate::image::ImageRecord;

/// Connection state of a [`SearchClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RemoteState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl RemoteState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

/// Vector database client that connects and sets up the schema on first use
///
/// Callers that overlap with a running initialization wait for it and share its
/// outcome instead of starting their own. A failed attempt leaves the client
/// uninitialized, so the next call tries again.
pub struct SearchClient<B> {
    backend: B,
    state: AtomicU8,
    /// Number of started initialization attempts
    attempts: AtomicU64,
    /// Held for the duration of an attempt, keeps the number and message of the
    /// last failed one
    init: Mutex<Option<(u64, String)>>,
}

/// Falls back to `Uninitialized` if an attempt is dropped halfway
struct ResetOnDrop<'a>(&'a AtomicU8);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let _ = self.0.compare_exchange(
            RemoteState::Initializing as u8,
            RemoteState::Uninitialized as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl<B: VectorBackend> SearchClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: AtomicU8::new(RemoteState::Uninitialized as u8),
            attempts: AtomicU64::new(0),
            init: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RemoteState {
        RemoteState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RemoteState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Connect and make sure the image class exists
    pub async fn initialize(&self) -> Result<()> {
        if self.state() == RemoteState::Ready {
            return Ok(());
        }

        // attempts are counted before the state turns `Initializing`, so one seen
        // in flight here is numbered at most `observed`
        let in_flight = self.state() == RemoteState::Initializing;
        let observed = self.attempts.load(Ordering::Acquire);
        // first attempt whose outcome this call shares
        let shared_from = if in_flight { observed } else { observed + 1 };

        let mut last_failure = self.init.lock().await;
        if self.state() == RemoteState::Ready {
            return Ok(());
        }
        if let Some((attempt, message)) = last_failure.as_ref() {
            if *attempt >= shared_from {
                return Err(Error::remote(RemoteOp::Connect, message));
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_state(RemoteState::Initializing);
        let _reset = ResetOnDrop(&self.state);
        info!("initializing search client");

        let result: Result<()> = async {
            self.backend.connect().await?;
            self.backend.ensure_schema().await
        }
        .await;

        match result {
            Ok(()) => {
                *last_failure = None;
                self.set_state(RemoteState::Ready);
                info!("search client initialized");
                Ok(())
            }
            Err(e) => {
                error!("failed to initialize search client: {}", e.report());
                *last_failure = Some((attempt, e.report()));
                self.set_state(RemoteState::Uninitialized);
                Err(e)
            }
        }
    }

    /// The backend, only once initialization has succeeded
    pub fn connected(&self) -> Result<&B> {
        match self.state() {
            RemoteState::Ready => Ok(&self.backend),
            _ => Err(Error::NotInitialized),
        }
    }

    async fn ready(&self) -> Result<&B> {
        self.initialize().await?;
        self.connected()
    }

    pub async fn insert(&self, image: &ImageRecord) -> Result<String> {
        let id = self.ready().await?.insert(image).await?;
        debug!("inserted {} as {}", image.filename(), id);
        Ok(id)
    }

    /// Nearest neighbors of `image`, in the order the database ranked them
    pub async fn query(
        &self,
        image: &ImageRecord,
        limit: usize,
        offset: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.ready().await?.query(image, limit, offset).await?;
        debug!("query for {} returned {} hits", image.filename(), hits.len());
        Ok(hits)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.ready().await?.delete(id).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.ready().await?.count().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;

    /// Counts setup calls; fails the first `failures` connects
    #[derive(Default)]
    struct CountingBackend {
        connects: AtomicUsize,
        schemas: AtomicUsize,
        failures: usize,
    }

    impl VectorBackend for CountingBackend {
        async fn connect(&self) -> Result<()> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.failures {
                return Err(Error::remote(RemoteOp::Connect, "connection refused"));
            }
            Ok(())
        }

        async fn ensure_schema(&self) -> Result<()> {
            self.schemas.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert(&self, _image: &ImageRecord) -> Result<String> {
            Ok("id".to_string())
        }

        async fn query(
            &self,
            _image: &ImageRecord,
            _limit: usize,
            _offset: Option<usize>,
        ) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }

        async fn delete(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }

        async fn count(&self) -> Result<u64> {
            Ok(42)
        }
    }

    #[tokio::test]
    async fn test_concurrent_initialize_runs_once() {
        let client = SearchClient::new(CountingBackend::default());
        assert_eq!(client.state(), RemoteState::Uninitialized);

        let results = join_all((0..8).map(|_| client.initialize())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
        assert_eq!(client.backend.schemas.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), RemoteState::Ready);

        client.initialize().await.unwrap();
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_across_tasks() {
        let client = Arc::new(SearchClient::new(CountingBackend::default()));
        let handles = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.initialize().await })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_shared_then_retried() {
        let client = SearchClient::new(CountingBackend { failures: 1, ..Default::default() });

        let results = join_all((0..4).map(|_| client.initialize())).await;
        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
        assert_eq!(client.backend.schemas.load(Ordering::SeqCst), 0);
        assert_eq!(client.state(), RemoteState::Uninitialized);

        client.initialize().await.unwrap();
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 2);
        assert_eq!(client.state(), RemoteState::Ready);
    }

    async fn wait_until_initializing<B: VectorBackend>(client: &SearchClient<B>) {
        while client.state() != RemoteState::Initializing {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_caller_arriving_mid_attempt_shares_failure() {
        let client = Arc::new(SearchClient::new(CountingBackend { failures: 1, ..Default::default() }));
        let first = tokio::spawn({
            let client = client.clone();
            async move { client.initialize().await }
        });
        wait_until_initializing(&client).await;

        assert!(client.initialize().await.is_err());
        assert!(first.await.unwrap().is_err());
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_does_not_replay_older_failure() {
        let client = Arc::new(SearchClient::new(CountingBackend { failures: 1, ..Default::default() }));
        assert!(client.initialize().await.is_err());

        let cancelled = tokio::spawn({
            let client = client.clone();
            async move { client.initialize().await }
        });
        wait_until_initializing(&client).await;

        let mut waiter = std::pin::pin!(client.initialize());
        assert!(futures::poll!(waiter.as_mut()).is_pending());
        cancelled.abort();

        waiter.await.unwrap();
        assert_eq!(client.state(), RemoteState::Ready);
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_operations_initialize_lazily() {
        let client = SearchClient::new(CountingBackend::default());
        assert!(matches!(client.connected(), Err(Error::NotInitialized)));

        assert_eq!(client.count().await.unwrap(), 42);
        assert_eq!(client.state(), RemoteState::Ready);
        assert!(client.delete("x").await.unwrap());
        assert_eq!(client.backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operation_fails_when_initialize_fails() {
        let client = SearchClient::new(CountingBackend { failures: 1, ..Default::default() });
        let err = client.count().await.unwrap_err();
        assert!(matches!(err, Error::Remote { op: RemoteOp::Connect, .. }));
        assert_eq!(client.count().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_dropped_initialize_resets_state() {
        let client = SearchClient::new(CountingBackend::default());
        let _ = tokio::time::timeout(Duration::from_millis(1), client.initialize()).await;
        assert_eq!(client.state(), RemoteState::Uninitialized);
        client.initialize().await.unwrap();
        assert_eq!(client.state(), RemoteState::Ready);
    }
}
