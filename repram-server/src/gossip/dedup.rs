//! Bounded deduplication cache for replicated message identifiers (§4.2.3).
//!
//! If a message identifier is in the cache, this node has already applied
//! (or deliberately refused) that message; re-receiving it produces no
//! local `Store::put` and no further forwarding. The cache never grows
//! without bound: first expired entries are evicted, then — if still over
//! the cap — the oldest half by first-seen moment.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct DedupEntry {
    ttl: Duration,
    first_seen: Instant,
}

struct DedupState {
    entries: HashMap<String, DedupEntry>,
}

pub struct DedupCache {
    state: Mutex<DedupState>,
    cap: usize,
}

impl DedupCache {
    pub fn new(cap: usize) -> Self {
        Self { state: Mutex::new(DedupState { entries: HashMap::new() }), cap }
    }

    /// Returns `true` if `message_id` was already present (a duplicate).
    /// If absent, records it with `ttl` and returns `false`. This check and
    /// insert happen under a single lock acquisition so a concurrent
    /// duplicate receive cannot slip through between "check" and "record".
    pub async fn check_and_insert(&self, message_id: &str, ttl: Duration) -> bool {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(message_id) {
            return true;
        }
        state.entries.insert(
            message_id.to_string(),
            DedupEntry { ttl, first_seen: Instant::now() },
        );
        self.evict_if_needed(&mut state);
        false
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    fn evict_if_needed(&self, state: &mut DedupState) {
        let now = Instant::now();
        state.entries.retain(|_, e| now.duration_since(e.first_seen) < e.ttl);

        if state.entries.len() <= self.cap {
            return;
        }

        let mut by_age: Vec<(String, Instant)> = state
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.first_seen))
            .collect();
        by_age.sort_by_key(|(_, first_seen)| *first_seen);

        let evict_count = by_age.len() / 2;
        for (id, _) in by_age.into_iter().take(evict_count) {
            state.entries.remove(&id);
        }
    }
}
