//! Bounded TLS session resumption store.
//!
//! # Responsibilities
//! - Keep server-side session state keyed by session id
//! - Serve resumption lookups; a miss just means a full handshake
//! - Bound memory with a capacity limit (oldest first) and a TTL
//!
//! # Design Decisions
//! - One mutex around map + insertion queue; critical sections are short
//! - Overwrites re-queue the entry; stale queue slots are skipped lazily
//! - Plugged into rustls as `StoresServerSessions`

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rustls::server::StoresServerSessions;

use crate::observability::metrics;

struct Entry {
    data: Vec<u8>,
    stored_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<Vec<u8>, Entry>,
    order: VecDeque<(Vec<u8>, u64)>,
    next_seq: u64,
}

/// Process-wide session store shared by every TLS connection.
pub struct SessionStore {
    state: Mutex<State>,
    capacity: usize,
    ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl SessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store session state, replacing any previous entry for `id`.
    pub fn put(&self, id: Vec<u8>, data: Vec<u8>) {
        let now = Instant::now();
        let mut state = self.lock();
        self.purge_expired(&mut state, now);

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.push_back((id.clone(), seq));
        state.entries.insert(
            id,
            Entry {
                data,
                stored_at: now,
                seq,
            },
        );

        while state.entries.len() > self.capacity {
            let Some((oldest, oldest_seq)) = state.order.pop_front() else {
                break;
            };
            if state.entries.get(&oldest).map(|e| e.seq) == Some(oldest_seq) {
                state.entries.remove(&oldest);
                metrics::record_session_event("evict");
            }
        }

        // Overwrites leave stale slots behind; rebuild once they dominate.
        if state.order.len() > self.capacity.saturating_mul(2) {
            let mut live: Vec<_> = state.entries.iter().map(|(k, e)| (k.clone(), e.seq)).collect();
            live.sort_by_key(|(_, seq)| *seq);
            state.order = live.into();
        }

        metrics::record_session_event("put");
        metrics::record_session_store_size(state.entries.len());
    }

    /// Look up session state. `None` means the client must do a full handshake.
    pub fn get(&self, id: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut state = self.lock();
        let fresh = state
            .entries
            .get(id)
            .map(|entry| now.duration_since(entry.stored_at) < self.ttl);
        let found = match fresh {
            Some(true) => state.entries.get(id).map(|entry| entry.data.clone()),
            Some(false) => {
                state.entries.remove(id);
                metrics::record_session_event("expired");
                None
            }
            None => None,
        };
        metrics::record_session_event(if found.is_some() { "hit" } else { "miss" });
        found
    }

    /// Remove and return session state (single-use tickets).
    pub fn take(&self, id: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut state = self.lock();
        let found = state
            .entries
            .remove(id)
            .filter(|entry| now.duration_since(entry.stored_at) < self.ttl)
            .map(|entry| entry.data);
        metrics::record_session_event(if found.is_some() { "hit" } else { "miss" });
        metrics::record_session_store_size(state.entries.len());
        found
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn purge_expired(&self, state: &mut State, now: Instant) {
        while let Some((id, seq)) = state.order.front() {
            let live_expired = match state.entries.get(id) {
                Some(entry) if entry.seq == *seq => {
                    if now.duration_since(entry.stored_at) < self.ttl {
                        break;
                    }
                    true
                }
                // Overwritten or already removed.
                _ => false,
            };
            if let Some((id, _)) = state.order.pop_front() {
                if live_expired {
                    state.entries.remove(&id);
                    metrics::record_session_event("expired");
                }
            }
        }
    }
}

impl StoresServerSessions for SessionStore {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        SessionStore::put(self, key, value);
        true
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        SessionStore::get(self, key)
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        SessionStore::take(self, key)
    }

    fn can_cache(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_then_get_returns_data() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        store.put(b"id-1".to_vec(), b"state".to_vec());

        assert_eq!(store.get(b"id-1"), Some(b"state".to_vec()));
        assert_eq!(store.get(b"unknown"), None);
    }

    #[test]
    fn put_overwrites() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        store.put(b"id".to_vec(), b"old".to_vec());
        store.put(b"id".to_vec(), b"new".to_vec());

        assert_eq!(store.get(b"id"), Some(b"new".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let store = SessionStore::new(2, Duration::from_secs(60));
        store.put(b"a".to_vec(), b"1".to_vec());
        store.put(b"b".to_vec(), b"2".to_vec());
        // Refresh "a" so "b" becomes the oldest.
        store.put(b"a".to_vec(), b"1'".to_vec());
        store.put(b"c".to_vec(), b"3".to_vec());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b"b"), None);
        assert_eq!(store.get(b"a"), Some(b"1'".to_vec()));
        assert_eq!(store.get(b"c"), Some(b"3".to_vec()));
    }

    #[test]
    fn expired_entries_read_as_missing() {
        let store = SessionStore::new(10, Duration::from_millis(20));
        store.put(b"id".to_vec(), b"state".to_vec());
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.get(b"id"), None);

        store.put(b"x".to_vec(), b"1".to_vec());
        std::thread::sleep(Duration::from_millis(40));
        store.put(b"y".to_vec(), b"2".to_vec());
        // "x" was purged by the second put.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn take_is_single_use() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        store.put(b"ticket".to_vec(), b"state".to_vec());

        assert_eq!(store.take(b"ticket"), Some(b"state".to_vec()));
        assert_eq!(store.take(b"ticket"), None);
    }

    #[test]
    fn heavy_overwrites_stay_bounded() {
        let store = SessionStore::new(4, Duration::from_secs(60));
        for i in 0..1000u32 {
            store.put(vec![(i % 3) as u8], i.to_be_bytes().to_vec());
        }
        assert_eq!(store.len(), 3);
        assert!(store.lock().order.len() <= 8);
    }

    #[test]
    fn concurrent_put_get() {
        let store = Arc::new(SessionStore::new(1000, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100u8 {
                        let id = vec![t, i];
                        store.put(id.clone(), vec![i]);
                        assert_eq!(store.get(&id), Some(vec![i]));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }

    #[test]
    fn works_as_rustls_storage() {
        let store: Arc<dyn StoresServerSessions> = Arc::new(SessionStore::new(10, Duration::from_secs(60)));
        assert!(store.put(b"k".to_vec(), b"v".to_vec()));
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        assert!(store.can_cache());
    }
}
