use repram_common::{ErrorResponse, PeerDescriptor, RepramError, Result, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use serde::Deserialize;

/// REPRAM client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address (`host:port`) of the node all requests are sent to.
    pub node_addr: String,
}

/// Outcome of a successful PUT, mirroring the server's 201/202 split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Quorum acknowledged the write before the client's deadline.
    Quorum,
    /// The write was accepted locally but quorum had not yet been reached.
    Pending,
}

/// Result returned by a successful GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub value: Vec<u8>,
    pub created_at_unix_ms: u64,
    pub ttl_secs: u64,
    pub remaining_secs: u64,
}

/// Metadata returned by a successful HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub created_at_unix_ms: u64,
    pub ttl_secs: u64,
    pub remaining_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListResult {
    pub keys: Vec<String>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResult {
    pub status: String,
    pub node_id: String,
    pub enclave: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResult {
    pub uptime_secs: u64,
    pub item_count: usize,
    pub bytes_in_use: usize,
    pub peer_count: usize,
    pub peer_joins_total: u64,
    pub peer_evictions_total: u64,
    pub requests_served: u64,
}

/// HTTP client for a single REPRAM node. REPRAM has no primary/replica split —
/// any node in the cluster accepts reads and writes, so the only configuration
/// a client needs is which node to talk to.
pub struct Client {
    pub config: ClientConfig,
    target: String,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new client targeting `config.node_addr`.
    pub fn new(config: ClientConfig) -> Self {
        let target = config.node_addr.clone();
        Self {
            config,
            target,
            http_client: reqwest::Client::new(),
        }
    }

    /// Point all subsequent requests at a different node (`host:port`).
    pub fn set_target(&mut self, addr: &str) {
        self.target = addr.to_string();
    }

    fn data_url(&self, key: &str) -> String {
        format!("http://{}/v1/data/{}", self.target, key)
    }

    fn keys_url(&self) -> String {
        format!("http://{}/v1/keys", self.target)
    }

    /// Store `value` under `key` with the given TTL (seconds).
    pub async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<PutOutcome> {
        if key.len() > MAX_KEY_SIZE {
            return Err(RepramError::KeyTooLarge(MAX_KEY_SIZE));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(RepramError::ValueTooLarge(MAX_VALUE_SIZE));
        }

        let response = self
            .http_client
            .put(self.data_url(key))
            .header("Content-Type", "application/octet-stream")
            .header("X-TTL", ttl_secs.to_string())
            .body(value.to_vec())
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;

        let status = response.status();
        match status.as_u16() {
            201 => Ok(PutOutcome::Quorum),
            202 => Ok(PutOutcome::Pending),
            _ => Err(parse_error_response(status, key, response).await),
        }
    }

    /// Fetch the value stored under `key`, if present and unexpired.
    pub async fn get(&self, key: &str) -> Result<GetResult> {
        if key.len() > MAX_KEY_SIZE {
            return Err(RepramError::KeyTooLarge(MAX_KEY_SIZE));
        }

        let response = self
            .http_client
            .get(self.data_url(key))
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, key, response).await);
        }

        let created_at_unix_ms = header_u64(&response, "x-created-at")?;
        let ttl_secs = header_u64(&response, "x-original-ttl")?;
        let remaining_secs = header_u64(&response, "x-remaining-ttl")?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;

        Ok(GetResult {
            value: bytes.to_vec(),
            created_at_unix_ms,
            ttl_secs,
            remaining_secs,
        })
    }

    /// Fetch TTL metadata for `key` without transferring the value.
    pub async fn head(&self, key: &str) -> Result<EntryMeta> {
        if key.len() > MAX_KEY_SIZE {
            return Err(RepramError::KeyTooLarge(MAX_KEY_SIZE));
        }

        let response = self
            .http_client
            .head(self.data_url(key))
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, key, response).await);
        }

        Ok(EntryMeta {
            created_at_unix_ms: header_u64(&response, "x-created-at")?,
            ttl_secs: header_u64(&response, "x-original-ttl")?,
            remaining_secs: header_u64(&response, "x-remaining-ttl")?,
        })
    }

    /// List keys, optionally filtered by `prefix` and paginated via `cursor`/`limit`.
    pub async fn list(
        &self,
        prefix: Option<&str>,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ListResult> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(p) = prefix {
            query.push(("prefix", p.to_string()));
        }
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        if let Some(l) = limit {
            query.push(("limit", l.to_string()));
        }

        let response = self
            .http_client
            .get(self.keys_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, "", response).await);
        }

        response
            .json::<ListResult>()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))
    }

    /// Query the target node's liveness.
    pub async fn health(&self) -> Result<HealthResult> {
        let url = format!("http://{}/v1/health", self.target);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, "", response).await);
        }
        response
            .json::<HealthResult>()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))
    }

    /// Query the target node's operational status.
    pub async fn status(&self) -> Result<StatusResult> {
        let url = format!("http://{}/v1/status", self.target);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, "", response).await);
        }
        response
            .json::<StatusResult>()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))
    }

    /// Query the target node's known peers.
    pub async fn topology(&self) -> Result<Vec<PeerDescriptor>> {
        let url = format!("http://{}/v1/topology", self.target);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, "", response).await);
        }
        response
            .json::<Vec<PeerDescriptor>>()
            .await
            .map_err(|e| RepramError::NetworkError(e.to_string()))
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> Result<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| RepramError::MissingHeader(name.to_string()))
}

async fn parse_error_response(
    status: reqwest::StatusCode,
    key: &str,
    response: reqwest::Response,
) -> RepramError {
    if status == reqwest::StatusCode::NOT_FOUND {
        return RepramError::KeyNotFound(key.to_string());
    }
    if status == reqwest::StatusCode::INSUFFICIENT_STORAGE {
        return RepramError::StorageFull;
    }

    let error_msg = response
        .json::<ErrorResponse>()
        .await
        .map(|r| r.error)
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    RepramError::HttpError(status.as_u16(), error_msg)
}
