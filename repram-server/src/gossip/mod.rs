//! The gossip-replication engine (§4.2): the hard core of the node.
//!
//! Ties together the peer registry (§4.2.1), the transport (§4.2.2), the
//! dedup cache (§4.2.3), fanout selection (§4.2.4), health probing
//! (§4.2.5), topology sync (§4.2.6) and optional HMAC authentication
//! (§4.2.7) into one engine the Coordinator and Request Surface call into.

pub mod auth;
pub mod dedup;
pub mod fanout;
pub mod health;
pub mod registry;
pub mod sync;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use repram_common::{
    BootstrapRequest, BootstrapResponse, GossipMessage, PeerDescriptor, RepramError, Result,
    SyncMessage,
};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::store::{PutOutcome, Store};
use auth::ClusterAuth;
use dedup::DedupCache;
use registry::PeerRegistry;
use transport::Transport;

pub struct GossipEngine {
    pub registry: PeerRegistry,
    dedup: DedupCache,
    transport: Arc<dyn Transport>,
    auth: ClusterAuth,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    pub self_node_id: String,
    pub self_address: String,
    pub self_enclave: String,
    fanout_threshold: usize,
}

impl GossipEngine {
    pub fn new(
        self_node_id: String,
        self_address: String,
        self_enclave: String,
        transport: Arc<dyn Transport>,
        auth: ClusterAuth,
        store: Arc<Store>,
        metrics: Arc<Metrics>,
        cap_dedup: usize,
        fanout_threshold: usize,
    ) -> Self {
        Self {
            registry: PeerRegistry::new(self_node_id.clone()),
            dedup: DedupCache::new(cap_dedup),
            transport,
            auth,
            store,
            metrics,
            self_node_id,
            self_address,
            self_enclave,
            fanout_threshold,
        }
    }

    /// Handles a message forwarded from a peer. Enforces dedup, applies the
    /// write (ignoring `Full` — a full node still ACKs so the cluster makes
    /// progress), and forwards onward. Returns `Err(AuthReject)` if the
    /// cluster secret is configured and the tag does not verify; callers
    /// must not surface that to HTTP clients (§7).
    pub async fn receive(&self, message: GossipMessage) -> Result<()> {
        if !self.verify(&message.auth_tag, &auth_bytes_of_message(&message)) {
            self.metrics.gossip_auth_rejections_total.inc();
            return Err(RepramError::AuthReject);
        }

        let is_duplicate = self
            .dedup
            .check_and_insert(&message.message_id, Duration::from_secs(message.ttl_secs))
            .await;
        if is_duplicate {
            debug!(message_id = %message.message_id, "duplicate gossip message, not re-applying");
            return Ok(());
        }

        if self.store.put(&message.key, message.payload.clone(), message.ttl_secs).await == PutOutcome::Full {
            warn!(key = %message.key, "store full on gossip apply; ACKing anyway per ACK-on-Full policy");
        }

        self.forward(&message).await;
        Ok(())
    }

    /// Called by the Coordinator right after a locally-originated write has
    /// already been applied to the Store. Registers the message id in the
    /// dedup cache (so an epidemic copy that loops back is recognized) and
    /// forwards to the fanout set. Does not re-apply locally.
    pub async fn broadcast_local(&self, message: &GossipMessage) {
        self.dedup
            .check_and_insert(&message.message_id, Duration::from_secs(message.ttl_secs))
            .await;
        self.forward(message).await;
    }

    /// Selects the fanout set of same-enclave peers (excluding this node and
    /// the message's origin) and sends the message onward with an
    /// incremented hop count. Send failures are absorbed here — they
    /// contribute to the target peer's failure count, not to the caller.
    async fn forward(&self, message: &GossipMessage) {
        let candidates = self.registry.same_enclave(&self.self_enclave, &message.origin_node_id).await;
        let mut rng = rand::thread_rng();
        let targets = fanout::select_fanout(&candidates, self.fanout_threshold, &mut rng);

        if targets.is_empty() {
            return;
        }

        let mut forwarded = message.clone();
        forwarded.hop_count += 1;

        for peer in targets {
            match self.transport.send_message(&peer.address, &forwarded).await {
                Ok(()) => self.registry.record_success(&peer.node_id).await,
                Err(e) => {
                    debug!(peer = %peer.node_id, error = %e, "gossip forward failed");
                    if self.registry.record_failure(&peer.node_id, crate::config::N_FAIL).await {
                        self.metrics.peer_evictions_total.inc();
                        info!(peer = %peer.node_id, "peer evicted after repeated forward failures");
                    }
                }
            }
        }
    }

    /// Handles an inbound SYNC: merges every peer the sender knows about
    /// into this node's registry, regardless of enclave.
    pub async fn handle_sync(&self, sync: SyncMessage) -> Result<()> {
        if !self.verify(&sync.auth_tag, &auth_bytes_of_sync(&sync)) {
            self.metrics.gossip_auth_rejections_total.inc();
            return Err(RepramError::AuthReject);
        }
        self.note_join(self.registry.join(&sync.sender_id, &sync.address, &sync.enclave).await, &sync.sender_id);
        for peer in &sync.peers {
            self.note_join(self.registry.join(&peer.node_id, &peer.address, &peer.enclave).await, &peer.node_id);
        }
        Ok(())
    }

    /// Handles an inbound bootstrap request: joins the requester, then
    /// returns this node's full current peer list plus itself, so the
    /// joiner seeds its registry in one round trip.
    pub async fn handle_bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapResponse> {
        if !self.verify(&request.auth_tag, &auth_bytes_of_bootstrap(&request)) {
            self.metrics.gossip_auth_rejections_total.inc();
            return Err(RepramError::AuthReject);
        }
        let joined = self.registry.join(&request.node_id, &request.address, &request.enclave).await;
        self.note_join(joined, &request.node_id);

        let mut peers: Vec<PeerDescriptor> =
            self.registry.all().await.iter().map(|p| p.descriptor()).collect();
        peers.push(PeerDescriptor {
            node_id: self.self_node_id.clone(),
            address: self.self_address.clone(),
            enclave: self.self_enclave.clone(),
        });
        Ok(BootstrapResponse { peers })
    }

    /// Contacts a bootstrap seed, joins every peer it returns (including
    /// the seed itself).
    pub async fn bootstrap_from(&self, seed_address: &str) -> Result<()> {
        let mut request = BootstrapRequest {
            node_id: self.self_node_id.clone(),
            address: self.self_address.clone(),
            enclave: self.self_enclave.clone(),
            auth_tag: None,
        };
        request.auth_tag = self.auth.tag_for(&auth_bytes_of_bootstrap(&request));

        let response = self.transport.bootstrap(seed_address, &request).await?;
        for peer in response.peers {
            let joined = self.registry.join(&peer.node_id, &peer.address, &peer.enclave).await;
            self.note_join(joined, &peer.node_id);
        }
        Ok(())
    }

    /// Bumps the join metric and logs when `joined` reports a new peer record.
    fn note_join(&self, joined: bool, node_id: &str) {
        if joined {
            self.metrics.peer_joins_total.inc();
            info!(peer = %node_id, "peer joined registry");
        }
    }

    /// Signs `message` in place if a cluster secret is configured.
    pub fn sign_message(&self, message: &mut GossipMessage) {
        message.auth_tag = self.auth.tag_for(&auth_bytes_of_message(message));
    }

    /// Sends `message` straight to `address`, bypassing dedup registration
    /// and fanout selection. Used by the Coordinator to collect direct
    /// quorum acknowledgements from a chosen replica set; epidemic
    /// convergence to the rest of the cluster still happens separately via
    /// [`GossipEngine::broadcast_local`].
    pub async fn send_direct(&self, address: &str, message: &GossipMessage) -> Result<()> {
        self.transport.send_message(address, message).await
    }

    fn verify(&self, tag: &Option<String>, authenticated_bytes: &[u8]) -> bool {
        self.auth.accepts(authenticated_bytes, tag)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Spawns the periodic health-probe task (§4.2.5).
    pub fn spawn_health_prober(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        health::spawn(Arc::clone(self))
    }

    /// Spawns the periodic topology-sync task (§4.2.6).
    pub fn spawn_topology_sync(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        sync::spawn(Arc::clone(self))
    }
}

fn auth_bytes_of_message(message: &GossipMessage) -> Vec<u8> {
    let mut m = message.clone();
    m.auth_tag = None;
    serde_json::to_vec(&m).expect("GossipMessage always serializes")
}

fn auth_bytes_of_sync(sync: &SyncMessage) -> Vec<u8> {
    let mut s = sync.clone();
    s.auth_tag = None;
    serde_json::to_vec(&s).expect("SyncMessage always serializes")
}

fn auth_bytes_of_bootstrap(request: &BootstrapRequest) -> Vec<u8> {
    let mut r = request.clone();
    r.auth_tag = None;
    serde_json::to_vec(&r).expect("BootstrapRequest always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SystemClock;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, GossipMessage)>>,
        fail_for: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_message(&self, address: &str, message: &GossipMessage) -> Result<()> {
            if self.fail_for.lock().unwrap().contains(&address.to_string()) {
                return Err(RepramError::NetworkError("simulated failure".to_string()));
            }
            self.sent.lock().await.push((address.to_string(), message.clone()));
            Ok(())
        }
        async fn send_sync(&self, _address: &str, _sync: &SyncMessage) -> Result<()> {
            Ok(())
        }
        async fn ping(&self, _address: &str) -> Result<()> {
            Ok(())
        }
        async fn bootstrap(&self, _address: &str, _request: &BootstrapRequest) -> Result<BootstrapResponse> {
            Ok(BootstrapResponse { peers: vec![] })
        }
    }

    fn make_message(id: &str, origin: &str) -> GossipMessage {
        GossipMessage {
            message_id: id.to_string(),
            key: "k".to_string(),
            payload: b"v".to_vec(),
            ttl_secs: 60,
            created_at_unix_ms: 0,
            origin_node_id: origin.to_string(),
            hop_count: 0,
            auth_tag: None,
        }
    }

    fn make_engine(transport: Arc<RecordingTransport>) -> GossipEngine {
        GossipEngine::new(
            "self".to_string(),
            "127.0.0.1:9000".to_string(),
            "default".to_string(),
            transport,
            ClusterAuth::Open,
            Arc::new(Store::new(1 << 20, Arc::new(SystemClock))),
            Arc::new(Metrics::new()),
            100,
            10,
        )
    }

    #[tokio::test]
    async fn receiving_a_message_applies_it_once() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = make_engine(transport);
        let msg = make_message("m1", "origin");
        engine.receive(msg.clone()).await.unwrap();
        let (payload, _) = engine.store.get("k").await.unwrap();
        assert_eq!(payload, b"v");
    }

    #[tokio::test]
    async fn duplicate_message_causes_exactly_one_store_put() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = make_engine(transport);
        let msg = make_message("m1", "origin");
        engine.receive(msg.clone()).await.unwrap();
        engine.store.put("k", b"changed-by-test".to_vec(), 60).await;
        engine.receive(msg.clone()).await.unwrap();
        let (payload, _) = engine.store.get("k").await.unwrap();
        // second receive was a dedup hit and did not re-apply the original value
        assert_eq!(payload, b"changed-by-test");
    }

    #[tokio::test]
    async fn forwarding_never_targets_the_message_origin() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = make_engine(transport.clone());
        engine.registry.join("origin", "10.0.0.1:9000", "default").await;
        engine.registry.join("peer-b", "10.0.0.2:9000", "default").await;

        let msg = make_message("m1", "origin");
        engine.receive(msg).await.unwrap();

        let sent = transport.sent.lock().await;
        assert!(sent.iter().all(|(addr, _)| addr != "10.0.0.1:9000"));
        assert!(sent.iter().any(|(addr, _)| addr == "10.0.0.2:9000"));
    }

    #[tokio::test]
    async fn forward_failure_increments_peer_failure_and_eventually_evicts() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_for.lock().unwrap().push("10.0.0.2:9000".to_string());
        let engine = make_engine(transport);
        engine.registry.join("peer-b", "10.0.0.2:9000", "default").await;

        for i in 0..3 {
            let msg = make_message(&format!("m{i}"), "origin");
            engine.receive(msg).await.unwrap();
        }

        assert!(engine.registry.get("peer-b").await.is_none());
        let (_, evictions) = engine.registry.counters().await;
        assert_eq!(evictions, 1);
    }

    #[tokio::test]
    async fn auth_reject_when_secret_configured_and_tag_missing() {
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = make_engine(transport);
        engine.auth = ClusterAuth::Secret("s3cr3t".to_string());
        let msg = make_message("m1", "origin");
        let result = engine.receive(msg).await;
        assert!(matches!(result, Err(RepramError::AuthReject)));
    }

    #[tokio::test]
    async fn signed_message_is_accepted_under_matching_secret() {
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = make_engine(transport);
        engine.auth = ClusterAuth::Secret("s3cr3t".to_string());
        let mut msg = make_message("m1", "origin");
        engine.sign_message(&mut msg);
        assert!(engine.receive(msg).await.is_ok());
    }

    #[tokio::test]
    async fn bootstrap_response_includes_self_and_known_peers() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = make_engine(transport);
        engine.registry.join("peer-b", "10.0.0.2:9000", "default").await;

        let request = BootstrapRequest {
            node_id: "joiner".to_string(),
            address: "10.0.0.3:9000".to_string(),
            enclave: "default".to_string(),
            auth_tag: None,
        };
        let response = engine.handle_bootstrap(request).await.unwrap();
        let ids: Vec<&str> = response.peers.iter().map(|p| p.node_id.as_str()).collect();
        assert!(ids.contains(&"self"));
        assert!(ids.contains(&"peer-b"));
        assert!(ids.contains(&"joiner"));
    }

    #[tokio::test]
    async fn sync_merges_unknown_peers_across_enclaves() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = make_engine(transport);
        let sync = SyncMessage {
            sender_id: "peer-b".to_string(),
            address: "10.0.0.2:9000".to_string(),
            enclave: "other-enclave".to_string(),
            peers: vec![PeerDescriptor {
                node_id: "peer-c".to_string(),
                address: "10.0.0.3:9000".to_string(),
                enclave: "yet-another".to_string(),
            }],
            auth_tag: None,
        };
        engine.handle_sync(sync).await.unwrap();
        assert!(engine.registry.get("peer-b").await.is_some());
        assert!(engine.registry.get("peer-c").await.is_some());
    }
}
