//! The in-memory, TTL-governed key-value store (component 1 of the node).
//!
//! A reader-writer discipline protects the map: `get`/`head`/`list` take the
//! read lock and never mutate state, even when they observe an expired
//! entry — deleting expired entries is exclusively the sweeper's job. This
//! rules out the common "expire on read" shortcut, which would otherwise
//! take a write lock under what callers expect to be a read path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio::time::interval;

/// Abstraction over current time, so TTL expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn unix_now_secs(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_now_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// Outcome of a `Store::put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Ok,
    /// The resulting live-payload bytes would exceed the configured cap.
    /// No state changed.
    Full,
}

/// A live value and its TTL metadata.
#[derive(Debug, Clone)]
struct ValueRecord {
    payload: Vec<u8>,
    created_at: u64,
    ttl_secs: u64,
    /// Monotonically increasing per-store counter, used only to give `list`
    /// a deterministic, cursor-friendly ordering.
    insertion_seq: u64,
}

impl ValueRecord {
    fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_secs)
    }

    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }
}

/// Metadata returned by `Store::get`/`Store::head`, without the payload.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub created_at: u64,
    pub ttl_secs: u64,
    /// Seconds remaining until expiry, clamped to zero.
    pub remaining_secs: u64,
}

struct StoreState {
    map: HashMap<String, ValueRecord>,
    bytes_in_use: usize,
}

/// The concurrent key-value store.
pub struct Store {
    state: RwLock<StoreState>,
    max_bytes: usize,
    next_insertion_seq: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(max_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState { map: HashMap::new(), bytes_in_use: 0 }),
            max_bytes,
            next_insertion_seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Copies `payload` into owned storage under `key` with the given TTL.
    ///
    /// If `key` already exists, the old record's byte footprint is released
    /// before the new record's footprint is charged, so an overwrite is
    /// charged only at the size delta. Returns `Full` (with no state change)
    /// if the resulting total live-payload bytes would exceed the cap.
    pub async fn put(&self, key: &str, payload: Vec<u8>, ttl_secs: u64) -> PutOutcome {
        let mut state = self.state.write().await;

        let old_size = state.map.get(key).map(|r| r.payload.len()).unwrap_or(0);
        let new_size = payload.len();
        let projected = state.bytes_in_use - old_size + new_size;
        if projected > self.max_bytes {
            return PutOutcome::Full;
        }

        let record = ValueRecord {
            payload,
            created_at: self.clock.unix_now_secs(),
            ttl_secs,
            insertion_seq: self.next_insertion_seq.fetch_add(1, Ordering::Relaxed),
        };
        state.bytes_in_use = projected;
        state.map.insert(key.to_string(), record);
        PutOutcome::Ok
    }

    /// Returns an owned copy of the payload and its metadata, or `None` if
    /// the key is absent or its TTL has elapsed. Never mutates the map —
    /// a record whose expiry has passed is left for the sweeper to remove.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, EntryMeta)> {
        let state = self.state.read().await;
        let record = state.map.get(key)?;
        let now = self.clock.unix_now_secs();
        if record.is_expired(now) {
            return None;
        }
        Some((record.payload.clone(), meta_of(record, now)))
    }

    /// Same policy as `get` but returns no payload.
    pub async fn head(&self, key: &str) -> Option<EntryMeta> {
        let state = self.state.read().await;
        let record = state.map.get(key)?;
        let now = self.clock.unix_now_secs();
        if record.is_expired(now) {
            return None;
        }
        Some(meta_of(record, now))
    }

    /// Lists keys present in the map, newest-first by insertion order.
    ///
    /// Listing is approximate: it reflects the last sweep, not real-time
    /// expiry, so a key can appear here whose `get` already returns `None`
    /// — the sweep simply hasn't reached it yet. `get` remains the exact
    /// authority; `list` is a hint.
    pub async fn list(
        &self,
        prefix: Option<&str>,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> (Vec<String>, Option<String>) {
        let state = self.state.read().await;

        let mut keyed: Vec<(&str, u64)> = state
            .map
            .iter()
            .map(|(k, r)| (k.as_str(), r.insertion_seq))
            .collect();
        keyed.sort_by_key(|(_, seq)| *seq);

        let cursor_seq: Option<u64> = cursor.and_then(|c| c.parse().ok());
        let mut iter = keyed
            .into_iter()
            .filter(|(k, _)| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .filter(|(_, seq)| cursor_seq.map(|c| *seq > c).unwrap_or(true));

        let limit = limit.unwrap_or(usize::MAX);
        let mut keys = Vec::new();
        let mut last_seq = None;
        let mut exhausted = true;
        while keys.len() < limit {
            match iter.next() {
                Some((k, seq)) => {
                    keys.push(k.to_string());
                    last_seq = Some(seq);
                }
                None => break,
            }
        }
        if iter.next().is_some() {
            exhausted = false;
        }

        let next_cursor = if exhausted { None } else { last_seq.map(|s| s.to_string()) };
        (keys, next_cursor)
    }

    /// `(item_count, bytes_in_use)`.
    pub async fn stats(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.map.len(), state.bytes_in_use)
    }

    /// Removes every entry whose expiry has passed, debiting the byte
    /// counter. Holds the writer lock only long enough to delete.
    async fn sweep_once(&self) {
        let mut state = self.state.write().await;
        let now = self.clock.unix_now_secs();
        let expired_keys: Vec<String> = state
            .map
            .iter()
            .filter(|(_, r)| r.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired_keys {
            if let Some(record) = state.map.remove(&key) {
                state.bytes_in_use -= record.payload.len();
            }
        }
    }

    /// Spawns the periodic sweeper. The returned handle should be aborted on
    /// shutdown so the background task terminates cleanly during drain.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tick.tick().await;
                store.sweep_once().await;
            }
        })
    }
}

fn meta_of(record: &ValueRecord, now: u64) -> EntryMeta {
    let expires_at = record.expires_at();
    let remaining_secs = expires_at.saturating_sub(now);
    EntryMeta { created_at: record.created_at, ttl_secs: record.ttl_secs, remaining_secs }
}
