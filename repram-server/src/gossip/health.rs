//! Health probing and failure detection (§4.2.5).
//!
//! Every `T_PING`, each known peer is pinged once. `N_FAIL` consecutive
//! failures evicts the peer from the registry; a single success resets the
//! counter to zero. Probing never touches the Store or the dedup cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::GossipEngine;
use crate::config;

/// Pings every peer currently in the registry once, serially. Kept serial
/// (rather than fanned out) since ping volume is O(peers), not O(writes).
pub async fn probe_once(engine: &GossipEngine) {
    for peer in engine.registry.all().await {
        match engine.transport.ping(&peer.address).await {
            Ok(()) => engine.registry.record_success(&peer.node_id).await,
            Err(e) => {
                debug!(peer = %peer.node_id, error = %e, "health ping failed");
                engine.metrics().ping_failures_total.inc();
                if engine.registry.record_failure(&peer.node_id, config::N_FAIL).await {
                    engine.metrics().peer_evictions_total.inc();
                    info!(peer = %peer.node_id, "peer evicted after {} consecutive failed pings", config::N_FAIL);
                }
            }
        }
    }
}

pub fn spawn(engine: Arc<GossipEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config::T_PING);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            probe_once(&engine).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::auth::ClusterAuth;
    use crate::gossip::transport::Transport;
    use crate::metrics::Metrics;
    use crate::store::{Store, SystemClock};
    use async_trait::async_trait;
    use repram_common::{BootstrapRequest, BootstrapResponse, GossipMessage, RepramError, Result, SyncMessage};
    use std::sync::Mutex;

    struct FlakyTransport {
        unreachable: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send_message(&self, _address: &str, _message: &GossipMessage) -> Result<()> {
            Ok(())
        }
        async fn send_sync(&self, _address: &str, _sync: &SyncMessage) -> Result<()> {
            Ok(())
        }
        async fn ping(&self, address: &str) -> Result<()> {
            if self.unreachable.lock().unwrap().contains(&address.to_string()) {
                Err(RepramError::NetworkError("unreachable".to_string()))
            } else {
                Ok(())
            }
        }
        async fn bootstrap(&self, _address: &str, _request: &BootstrapRequest) -> Result<BootstrapResponse> {
            Ok(BootstrapResponse { peers: vec![] })
        }
    }

    fn make_engine(transport: Arc<FlakyTransport>) -> GossipEngine {
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
    async fn repeated_failures_evict_peer() {
        let transport = Arc::new(FlakyTransport { unreachable: Mutex::new(vec!["10.0.0.2:9000".to_string()]) });
        let engine = make_engine(transport);
        engine.registry.join("peer-b", "10.0.0.2:9000", "default").await;

        for _ in 0..config::N_FAIL {
            probe_once(&engine).await;
        }

        assert!(engine.registry.get("peer-b").await.is_none());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let transport = Arc::new(FlakyTransport { unreachable: Mutex::new(vec!["10.0.0.2:9000".to_string()]) });
        let engine = make_engine(transport.clone());
        engine.registry.join("peer-b", "10.0.0.2:9000", "default").await;

        probe_once(&engine).await;
        probe_once(&engine).await;
        transport.unreachable.lock().unwrap().clear();
        probe_once(&engine).await;

        let peer = engine.registry.get("peer-b").await.unwrap();
        assert_eq!(peer.consecutive_failures, 0);
    }
}
