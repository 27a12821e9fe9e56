//! The peer registry (§4.2.1): known peers, join/eviction bookkeeping.
//!
//! Membership means "known to exist"; reachability is a separate property
//! tracked per-peer by the health prober (§4.2.5) via `consecutive_failures`.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;

use repram_common::PeerDescriptor;

/// A known peer. `last_success` and `join_time` are process-local `Instant`s,
/// never serialized — the wire-level projection is `PeerDescriptor`.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub node_id: String,
    pub address: String,
    pub enclave: String,
    pub last_success: Instant,
    pub consecutive_failures: u32,
    pub join_time: Instant,
}

impl PeerRecord {
    pub fn descriptor(&self) -> PeerDescriptor {
        PeerDescriptor {
            node_id: self.node_id.clone(),
            address: self.address.clone(),
            enclave: self.enclave.clone(),
        }
    }
}

struct RegistryState {
    peers: HashMap<String, PeerRecord>,
    joins_total: u64,
    evictions_total: u64,
}

pub struct PeerRegistry {
    state: RwLock<RegistryState>,
    self_node_id: String,
}

impl PeerRegistry {
    pub fn new(self_node_id: String) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                peers: HashMap::new(),
                joins_total: 0,
                evictions_total: 0,
            }),
            self_node_id,
        }
    }

    /// Introduces or re-announces a peer. Idempotent on identity: an
    /// already-known `node_id` has its advertised address updated but is
    /// not duplicated and its failure counter is untouched. Returns `true`
    /// if this call created a new record (a join or a rejoin after
    /// eviction), `false` if it only refreshed an existing one.
    pub async fn join(&self, node_id: &str, address: &str, enclave: &str) -> bool {
        if node_id == self.self_node_id {
            return false;
        }
        let mut state = self.state.write().await;
        if let Some(existing) = state.peers.get_mut(node_id) {
            existing.address = address.to_string();
            existing.enclave = enclave.to_string();
            return false;
        }
        state.peers.insert(
            node_id.to_string(),
            PeerRecord {
                node_id: node_id.to_string(),
                address: address.to_string(),
                enclave: enclave.to_string(),
                last_success: Instant::now(),
                consecutive_failures: 0,
                join_time: Instant::now(),
            },
        );
        state.joins_total += 1;
        true
    }

    /// Records a successful contact with `node_id`, resetting its failure
    /// counter. A no-op if the peer is not registered.
    pub async fn record_success(&self, node_id: &str) {
        let mut state = self.state.write().await;
        if let Some(peer) = state.peers.get_mut(node_id) {
            peer.last_success = Instant::now();
            peer.consecutive_failures = 0;
        }
    }

    /// Records a failed contact with `node_id`. Evicts the peer once its
    /// consecutive-failure counter reaches `n_fail`. Returns `true` if this
    /// call evicted the peer.
    pub async fn record_failure(&self, node_id: &str, n_fail: u32) -> bool {
        let mut state = self.state.write().await;
        let Some(peer) = state.peers.get_mut(node_id) else { return false };
        peer.consecutive_failures += 1;
        if peer.consecutive_failures >= n_fail {
            state.peers.remove(node_id);
            state.evictions_total += 1;
            return true;
        }
        false
    }

    /// All peers currently known, regardless of enclave.
    pub async fn all(&self) -> Vec<PeerRecord> {
        self.state.read().await.peers.values().cloned().collect()
    }

    /// Peers sharing `enclave`, excluding `exclude_node_id` (typically this
    /// node or the message's origin).
    pub async fn same_enclave(&self, enclave: &str, exclude_node_id: &str) -> Vec<PeerRecord> {
        self.state
            .read()
            .await
            .peers
            .values()
            .filter(|p| p.enclave == enclave && p.node_id != exclude_node_id)
            .cloned()
            .collect()
    }

    pub async fn get(&self, node_id: &str) -> Option<PeerRecord> {
        self.state.read().await.peers.get(node_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.peers.len()
    }

    pub async fn counters(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.joins_total, state.evictions_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_is_idempotent_on_identity() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("peer-a", "10.0.0.1:9000", "default").await;
        registry.join("peer-a", "10.0.0.2:9000", "default").await;
        assert_eq!(registry.len().await, 1);
        let peer = registry.get("peer-a").await.unwrap();
        assert_eq!(peer.address, "10.0.0.2:9000");
    }

    #[tokio::test]
    async fn self_join_is_ignored() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("self", "127.0.0.1:9000", "default").await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn eviction_at_n_fail_consecutive_failures() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("peer-a", "10.0.0.1:9000", "default").await;

        assert!(!registry.record_failure("peer-a", 3).await);
        assert!(!registry.record_failure("peer-a", 3).await);
        assert!(registry.record_failure("peer-a", 3).await);

        assert!(registry.get("peer-a").await.is_none());
        let (_, evictions) = registry.counters().await;
        assert_eq!(evictions, 1);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("peer-a", "10.0.0.1:9000", "default").await;
        registry.record_failure("peer-a", 3).await;
        registry.record_failure("peer-a", 3).await;
        registry.record_success("peer-a").await;
        assert!(!registry.record_failure("peer-a", 3).await);
        assert!(!registry.record_failure("peer-a", 3).await);
    }

    #[tokio::test]
    async fn rejoin_after_eviction_is_a_fresh_record() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("peer-a", "10.0.0.1:9000", "default").await;
        for _ in 0..3 {
            registry.record_failure("peer-a", 3).await;
        }
        assert!(registry.get("peer-a").await.is_none());

        registry.join("peer-a", "10.0.0.1:9000", "default").await;
        let peer = registry.get("peer-a").await.unwrap();
        assert_eq!(peer.consecutive_failures, 0);
        let (joins, _) = registry.counters().await;
        assert_eq!(joins, 2);
    }

    #[tokio::test]
    async fn same_enclave_excludes_other_enclaves_and_excluded_node() {
        let registry = PeerRegistry::new("self".to_string());
        registry.join("a", "1", "enclave-1").await;
        registry.join("b", "2", "enclave-1").await;
        registry.join("c", "3", "enclave-2").await;

        let peers = registry.same_enclave("enclave-1", "a").await;
        let ids: Vec<_> = peers.iter().map(|p| p.node_id.clone()).collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }
}
