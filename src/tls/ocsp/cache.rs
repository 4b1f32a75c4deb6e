//! OCSP response cache with single-flight fetching.
//!
//! # Responsibilities
//! - Probe: non-blocking lookup by OcspKey
//! - FetchAndStore: ask the responder on a miss, store on success
//! - Collapse concurrent fetches for the same key into one request
//!
//! # Design Decisions
//! - A pass-through memo: freshness is the responder's business unless
//!   `max_age` is configured
//! - Fetches are bounded by a timeout; timeout is `Unavailable`
//! - Failed fetches are not cached; the next handshake retries
//! - A fetch runs as its own task and leaves the pending map when it
//!   finishes, whether or not anyone still waits for it

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::observability::metrics;
use crate::tls::ocsp::request::{check_response, OcspKey, OcspRequest};
use crate::tls::ocsp::responder::OcspResponder;
use crate::tls::ocsp::OcspError;

/// A cached responder answer.
#[derive(Debug, Clone)]
pub struct OcspEntry {
    pub key: OcspKey,
    pub response: Bytes,
    pub fetched_at: Instant,
}

type PendingFetch = Shared<BoxFuture<'static, Result<OcspEntry, OcspError>>>;
type PendingMap = Arc<Mutex<HashMap<OcspKey, PendingFetch>>>;

pub struct OcspCache {
    entries: Arc<DashMap<OcspKey, OcspEntry>>,
    pending: PendingMap,
    responder: Arc<dyn OcspResponder>,
    fetch_timeout: Duration,
    max_age: Option<Duration>,
}

impl OcspCache {
    pub fn new(responder: Arc<dyn OcspResponder>, fetch_timeout: Duration, max_age: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            responder,
            fetch_timeout,
            max_age,
        }
    }

    /// Cached entry for `key`, if present and not past `max_age`.
    pub fn probe(&self, key: &OcspKey) -> Option<OcspEntry> {
        let entry = self.entries.get(key).map(|e| e.value().clone());
        match (entry, self.max_age) {
            (Some(entry), Some(max_age)) if entry.fetched_at.elapsed() >= max_age => {
                self.entries.remove(key);
                metrics::record_ocsp_cache_size(self.entries.len());
                None
            }
            (entry, _) => entry,
        }
    }

    /// Fetch from the responder and store the result.
    ///
    /// Concurrent callers for the same key share one network request.
    pub async fn fetch_and_store(&self, request: &OcspRequest) -> Result<OcspEntry, OcspError> {
        let fetch = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending
                .entry(request.key.clone())
                .or_insert_with(|| self.start_fetch(request))
                .clone()
        };

        fetch.await
    }

    /// Probe, then fetch on a miss.
    pub async fn lookup(&self, request: &OcspRequest) -> Result<OcspEntry, OcspError> {
        if let Some(entry) = self.probe(&request.key) {
            metrics::record_ocsp_lookup("hit");
            tracing::trace!(key = %request.key, "OCSP hit");
            return Ok(entry);
        }
        metrics::record_ocsp_lookup("miss");
        tracing::debug!(key = %request.key, "OCSP miss");

        let result = self.fetch_and_store(request).await;
        if result.is_err() {
            metrics::record_ocsp_lookup("error");
        }
        result
    }

    /// Spawn the fetch for `request`. Called with the pending map locked,
    /// so the task's own removal always comes after the insert.
    fn start_fetch(&self, request: &OcspRequest) -> PendingFetch {
        let responder = self.responder.clone();
        let entries = self.entries.clone();
        let pending = self.pending.clone();
        let timeout = self.fetch_timeout;
        let url = request.responder_url.clone();
        let der = request.der.clone();
        let key = request.key.clone();
        let task_key = key.clone();

        let fetch = async move {
            let response = match tokio::time::timeout(timeout, responder.fetch(&url, &der)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(OcspError::Unavailable(format!(
                        "responder {} timed out after {:?}",
                        url, timeout
                    )))
                }
            };
            check_response(&response)?;

            let entry = OcspEntry {
                key: key.clone(),
                response,
                fetched_at: Instant::now(),
            };
            entries.insert(key, entry.clone());
            metrics::record_ocsp_cache_size(entries.len());
            tracing::info!(url = %url, bytes = entry.response.len(), "OCSP response fetched");
            Ok(entry)
        };

        let task = tokio::spawn(async move {
            let result = fetch.await;
            pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&task_key);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(OcspError::Unavailable(format!("OCSP fetch task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached response.
    pub fn clear(&self) {
        self.entries.clear();
        metrics::record_ocsp_cache_size(0);
        tracing::info!("OCSP cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::ocsp::request::tests::leaf_and_issuer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn good_response() -> Bytes {
        // SEQUENCE { ENUMERATED 0, [0] { SEQUENCE {} } }
        Bytes::from_static(&[0x30, 0x07, 0x0A, 0x01, 0x00, 0xA0, 0x02, 0x30, 0x00])
    }

    struct CountingResponder {
        calls: AtomicUsize,
        delay: Duration,
        answer: Result<Bytes, OcspError>,
    }

    impl CountingResponder {
        fn new(delay: Duration, answer: Result<Bytes, OcspError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                answer,
            })
        }
    }

    #[async_trait]
    impl OcspResponder for CountingResponder {
        async fn fetch(&self, _url: &str, _request: &[u8]) -> Result<Bytes, OcspError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer.clone()
        }
    }

    fn request() -> OcspRequest {
        let (leaf, issuer) = leaf_and_issuer(Some("http://ocsp.test/"));
        OcspRequest::for_certificate(&leaf, &issuer).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let responder = CountingResponder::new(Duration::ZERO, Ok(good_response()));
        let cache = OcspCache::new(responder.clone(), Duration::from_secs(1), None);
        let request = request();

        assert!(cache.probe(&request.key).is_none());
        let fetched = cache.fetch_and_store(&request).await.unwrap();
        let probed = cache.probe(&request.key).unwrap();

        assert_eq!(probed.response, good_response());
        assert_eq!(probed.fetched_at, fetched.fetched_at);

        cache.lookup(&request).await.unwrap();
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_fetches_collapse() {
        let responder = CountingResponder::new(Duration::from_millis(50), Ok(good_response()));
        let cache = Arc::new(OcspCache::new(responder.clone(), Duration::from_secs(1), None));
        let request = request();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                let request = request.clone();
                tokio::spawn(async move { cache.lookup(&request).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
        assert!(cache.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abandoned_fetch_still_completes() {
        let responder = CountingResponder::new(Duration::from_millis(50), Ok(good_response()));
        let cache = OcspCache::new(responder.clone(), Duration::from_secs(1), None);
        let request = request();

        // The only waiter gives up long before the responder answers.
        assert!(tokio::time::timeout(Duration::from_millis(5), cache.lookup(&request))
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.pending.lock().unwrap().is_empty());
        assert_eq!(cache.probe(&request.key).unwrap().response, good_response());

        cache.lookup(&request).await.unwrap();
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_responder_times_out() {
        let responder = CountingResponder::new(Duration::from_secs(5), Ok(good_response()));
        let cache = OcspCache::new(responder, Duration::from_millis(20), None);
        let request = request();

        let err = cache.lookup(&request).await.unwrap_err();
        assert!(matches!(err, OcspError::Unavailable(_)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn responder_errors_are_not_cached() {
        let try_later = Bytes::from_static(&[0x30, 0x03, 0x0A, 0x01, 0x03]);
        let responder = CountingResponder::new(Duration::ZERO, Ok(try_later));
        let cache = OcspCache::new(responder.clone(), Duration::from_secs(1), None);
        let request = request();

        assert_eq!(
            cache.lookup(&request).await.unwrap_err(),
            OcspError::ResponderError("tryLater".into())
        );
        assert!(cache.lookup(&request).await.is_err());
        assert_eq!(responder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn max_age_forces_refetch() {
        let responder = CountingResponder::new(Duration::ZERO, Ok(good_response()));
        let cache = OcspCache::new(responder.clone(), Duration::from_secs(1), Some(Duration::from_millis(10)));
        let request = request();

        cache.lookup(&request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.probe(&request.key).is_none());
        cache.lookup(&request).await.unwrap();
        assert_eq!(responder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let responder = CountingResponder::new(Duration::ZERO, Ok(good_response()));
        let cache = OcspCache::new(responder, Duration::from_secs(1), None);
        cache.lookup(&request()).await.unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
