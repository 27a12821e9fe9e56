//! Topology sync (§4.2.6).
//!
//! Every `T_SYNC`, this node pushes its full known peer list to every peer
//! it knows about, regardless of enclave — this is how peer knowledge
//! crosses enclave boundaries even though data replication never does.

use std::sync::Arc;

use repram_common::{PeerDescriptor, SyncMessage};
use tokio::task::JoinHandle;
use tracing::debug;

use super::GossipEngine;
use crate::config;

pub async fn sync_once(engine: &GossipEngine) {
    let known_peers = engine.registry.all().await;
    if known_peers.is_empty() {
        return;
    }

    let peer_descriptors: Vec<PeerDescriptor> = known_peers.iter().map(|p| p.descriptor()).collect();

    for peer in &known_peers {
        let mut message = SyncMessage {
            sender_id: engine.self_node_id.clone(),
            address: engine.self_address.clone(),
            enclave: engine.self_enclave.clone(),
            peers: peer_descriptors.clone(),
            auth_tag: None,
        };
        message.auth_tag = engine.auth.tag_for(&super::auth_bytes_of_sync(&message));

        if let Err(e) = engine.transport.send_sync(&peer.address, &message).await {
            debug!(peer = %peer.node_id, error = %e, "topology sync send failed");
        }
    }
}

pub fn spawn(engine: Arc<GossipEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config::T_SYNC);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sync_once(&engine).await;
        }
    })
}
