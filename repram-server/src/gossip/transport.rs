//! The abstract message transport (§4.2.2).
//!
//! The engine depends only on this trait, not on HTTP semantics directly;
//! `HttpTransport` is the concrete implementation riding the same axum
//! listener the Request Surface serves (`/v1/gossip/message`,
//! `/v1/bootstrap`). Timeouts are per-call and bounded.

use std::time::Duration;

use async_trait::async_trait;
use repram_common::{BootstrapRequest, BootstrapResponse, GossipMessage, RepramError, Result, SyncMessage};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Forwards a replicated write to `address`. `Ok` is this call's ACK.
    async fn send_message(&self, address: &str, message: &GossipMessage) -> Result<()>;

    /// Sends a topology SYNC to `address`.
    async fn send_sync(&self, address: &str, sync: &SyncMessage) -> Result<()>;

    /// A liveness probe; any successful HTTP response counts as reachable.
    async fn ping(&self, address: &str) -> Result<()>;

    /// Exchanges peer lists with a bootstrap seed.
    async fn bootstrap(&self, address: &str, request: &BootstrapRequest) -> Result<BootstrapResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client }
    }

    fn url(address: &str, path: &str) -> String {
        format!("http://{address}{path}")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_message(&self, address: &str, message: &GossipMessage) -> Result<()> {
        let response = self
            .client
            .post(Self::url(address, "/v1/gossip/message"))
            .json(message)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RepramError::HttpError(response.status().as_u16(), "gossip forward rejected".to_string()))
        }
    }

    async fn send_sync(&self, address: &str, sync: &SyncMessage) -> Result<()> {
        let response = self
            .client
            .post(Self::url(address, "/v1/internal/sync"))
            .json(sync)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RepramError::HttpError(response.status().as_u16(), "sync rejected".to_string()))
        }
    }

    async fn ping(&self, address: &str) -> Result<()> {
        let response = self
            .client
            .get(Self::url(address, "/v1/health"))
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RepramError::HttpError(response.status().as_u16(), "ping failed".to_string()))
        }
    }

    async fn bootstrap(&self, address: &str, request: &BootstrapRequest) -> Result<BootstrapResponse> {
        let response = self
            .client
            .post(Self::url(address, "/v1/bootstrap"))
            .json(request)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RepramError::HttpError(response.status().as_u16(), "bootstrap rejected".to_string()));
        }
        response
            .json::<BootstrapResponse>()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))
    }
}
