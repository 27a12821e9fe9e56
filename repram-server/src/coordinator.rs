//! The Coordinator (§4.3): turns a client PUT into a quorum-acknowledged,
//! gossip-replicated write.
//!
//! A message id is minted from this node's identity, a nanosecond
//! timestamp and a strictly increasing per-node counter, so ids are unique
//! even if the clock is coarse or two writes land in the same nanosecond
//! isn't possible but ties are still broken by the counter. The id keys a
//! pending-write slot tracking how many of the targeted replicas have
//! acknowledged; once the quorum is reached (or the wait times out) the
//! slot is retired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use repram_common::{GossipMessage, RepramError, Result};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::gossip::GossipEngine;
use crate::store::{PutOutcome as StorePutOutcome, Store};

/// Whether a PUT was confirmed by quorum before its deadline, or is still
/// propagating in the background when the deadline was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Quorum,
    Pending,
}

pub struct PutResult {
    pub outcome: WriteOutcome,
}

struct PendingWrite {
    acks: AtomicUsize,
    quorum: usize,
    notify: Notify,
}

pub struct Coordinator {
    store: Arc<Store>,
    gossip: Arc<GossipEngine>,
    pending: Mutex<HashMap<String, Arc<PendingWrite>>>,
    message_counter: AtomicU64,
    pub replication_factor: usize,
    pub write_timeout: Duration,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
}

impl Coordinator {
    pub fn new(
        store: Arc<Store>,
        gossip: Arc<GossipEngine>,
        replication_factor: usize,
        write_timeout: Duration,
        min_ttl_secs: u64,
        max_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            gossip,
            pending: Mutex::new(HashMap::new()),
            message_counter: AtomicU64::new(0),
            replication_factor,
            write_timeout,
            min_ttl_secs,
            max_ttl_secs,
        }
    }

    /// Validates bounds, applies the write locally, replicates to a quorum
    /// of same-enclave peers (direct sends, counted synchronously) and
    /// hands the message to the gossip engine for epidemic convergence
    /// across the rest of the cluster. Returns `Quorum` if enough replicas
    /// acknowledged before `write_timeout`, `Pending` if the deadline hit
    /// first — the write is accepted either way (202 is not a failure) and
    /// replication continues in the background. If the local apply itself
    /// reports the store full, the write is rejected outright with
    /// `StorageFull` before any replication is attempted: this is a
    /// client-facing capacity error, distinct from the ACK-on-Full policy
    /// the gossip engine applies when a peer forwards it an already-minted
    /// message (the forwarding peer's quorum must not be punished for this
    /// node's capacity).
    pub async fn put(&self, key: &str, payload: Vec<u8>, ttl_secs: u64) -> Result<PutResult> {
        self.validate(key, &payload, ttl_secs)?;

        let now_ms = unix_now_ms();
        if self.store.put(key, payload.clone(), ttl_secs).await == StorePutOutcome::Full {
            warn!(key, "local store full on coordinator apply; rejecting client write");
            return Err(RepramError::StorageFull);
        }

        let message_id = self.mint_message_id();
        let message = GossipMessage {
            message_id: message_id.clone(),
            key: key.to_string(),
            payload,
            ttl_secs,
            created_at_unix_ms: now_ms,
            origin_node_id: self.gossip.self_node_id.clone(),
            hop_count: 0,
            auth_tag: None,
        };
        let mut signed = message.clone();
        self.gossip.sign_message(&mut signed);

        let enclave_peers = self.gossip.registry.same_enclave(&self.gossip.self_enclave, &self.gossip.self_node_id).await;
        let quorum = quorum_size(self.replication_factor, enclave_peers.len());

        let pending = Arc::new(PendingWrite {
            acks: AtomicUsize::new(1), // local apply counts as this node's own vote
            quorum,
            notify: Notify::new(),
        });
        self.pending.lock().await.insert(message_id.clone(), pending.clone());

        let mut targets = enclave_peers;
        let mut rng = rand::thread_rng();
        targets.shuffle(&mut rng);
        targets.truncate(self.replication_factor.saturating_sub(1));

        for peer in targets {
            let gossip = Arc::clone(&self.gossip);
            let pending = Arc::clone(&pending);
            let signed = signed.clone();
            tokio::spawn(async move {
                match gossip.send_direct(&peer.address, &signed).await {
                    Ok(()) => {
                        pending.acks.fetch_add(1, Ordering::SeqCst);
                        pending.notify.notify_waiters();
                    }
                    Err(e) => debug!(peer = %peer.node_id, error = %e, "direct replica write failed"),
                }
            });
        }

        self.gossip.broadcast_local(&signed).await;

        let outcome = self.await_quorum(&pending).await;
        self.pending.lock().await.remove(&message_id);

        Ok(PutResult { outcome })
    }

    /// Polls the ack counter rather than relying solely on `Notify`'s
    /// edge-triggered wakeups: an ack can land between this loop checking
    /// the count and registering as a waiter, and a missed wakeup would
    /// otherwise cost the full timeout instead of a few milliseconds.
    async fn await_quorum(&self, pending: &Arc<PendingWrite>) -> WriteOutcome {
        const POLL_INTERVAL: Duration = Duration::from_millis(2);
        let deadline = tokio::time::Instant::now() + self.write_timeout;
        loop {
            if pending.acks.load(Ordering::SeqCst) >= pending.quorum {
                return WriteOutcome::Quorum;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return WriteOutcome::Pending;
            }
            let wait = remaining.min(POLL_INTERVAL);
            let _ = tokio::time::timeout(wait, pending.notify.notified()).await;
        }
    }

    fn validate(&self, key: &str, payload: &[u8], ttl_secs: u64) -> Result<()> {
        if key.is_empty() {
            return Err(RepramError::InvalidInput("key must not be empty".to_string()));
        }
        if key.len() > repram_common::MAX_KEY_SIZE {
            return Err(RepramError::KeyTooLarge(repram_common::MAX_KEY_SIZE));
        }
        if payload.len() > repram_common::MAX_VALUE_SIZE {
            return Err(RepramError::ValueTooLarge(repram_common::MAX_VALUE_SIZE));
        }
        if ttl_secs < self.min_ttl_secs || ttl_secs > self.max_ttl_secs {
            return Err(RepramError::InvalidInput(format!(
                "ttl_secs must be between {} and {}",
                self.min_ttl_secs, self.max_ttl_secs
            )));
        }
        Ok(())
    }

    fn mint_message_id(&self) -> String {
        let counter = self.message_counter.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        format!("{}-{}-{}", self.gossip.self_node_id, nanos, counter)
    }
}

/// `Q = min(replication_factor, ceil((E+1)/2))`, where `E` is the number of
/// other peers sharing this node's enclave. `E+1` is the enclave's total
/// size including this node, so quorum is always a strict majority of the
/// enclave, capped by the configured replication factor.
fn quorum_size(replication_factor: usize, other_peers_same_enclave: usize) -> usize {
    let enclave_size = other_peers_same_enclave + 1;
    let majority = (enclave_size + 1) / 2;
    replication_factor.min(majority).max(1)
}

fn unix_now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
