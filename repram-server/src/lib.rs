//! The Request Surface (§4.4): the thin HTTP boundary over the Coordinator.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, MatchedPath, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use repram_common::{BootstrapRequest, ErrorResponse, GossipMessage, RepramError, MAX_KEY_SIZE, MAX_VALUE_SIZE};

pub mod config;
pub mod coordinator;
pub mod gossip;
pub mod metrics;
pub mod store;

use config::DRAIN_WINDOW;
use coordinator::{Coordinator, WriteOutcome};
use gossip::auth::ClusterAuth;
use gossip::transport::HttpTransport;
use gossip::GossipEngine;
use metrics::Metrics;
use store::{Store, SystemClock};

/// Everything the node needs at startup to construct its `AppState`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub address: String,
    pub enclave: String,
    pub max_storage_bytes: usize,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub write_timeout: Duration,
    pub replication_factor: usize,
    pub cluster_secret: Option<String>,
    pub fanout_threshold: usize,
    pub cap_dedup: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub gossip: Arc<GossipEngine>,
    pub coordinator: Arc<Coordinator>,
    pub metrics: Arc<Metrics>,
    pub node_id: String,
    pub enclave: String,
    pub started_at: Instant,
    pub requests_served: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(node_config: &NodeConfig) -> Self {
        let store = Arc::new(Store::new(node_config.max_storage_bytes, Arc::new(SystemClock)));
        let metrics = Arc::new(Metrics::new());
        let transport = Arc::new(HttpTransport::new(config::TRANSPORT_TIMEOUT));
        let auth = ClusterAuth::from_config(node_config.cluster_secret.clone());

        let gossip = Arc::new(GossipEngine::new(
            node_config.node_id.clone(),
            node_config.address.clone(),
            node_config.enclave.clone(),
            transport,
            auth,
            store.clone(),
            metrics.clone(),
            node_config.cap_dedup,
            node_config.fanout_threshold,
        ));

        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            gossip.clone(),
            node_config.replication_factor,
            node_config.write_timeout,
            node_config.min_ttl_secs,
            node_config.max_ttl_secs,
        ));

        Self {
            store,
            gossip,
            coordinator,
            metrics,
            node_id: node_config.node_id.clone(),
            enclave: node_config.enclave.clone(),
            started_at: Instant::now(),
            requests_served: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns every background worker (sweeper, health prober, topology
    /// sync). Returned handles should be aborted during shutdown drain.
    pub fn spawn_background_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.store.spawn_sweeper(config::SWEEP_INTERVAL),
            self.gossip.spawn_health_prober(),
            self.gossip.spawn_topology_sync(),
        ]
    }
}

pub struct Server {
    address: SocketAddr,
    state: AppState,
}

impl Server {
    pub fn new(address: SocketAddr, state: AppState) -> Self {
        Self { address, state }
    }

    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/v1/data/:key", get(handle_get).put(handle_put).head(handle_head))
            .route("/v1/keys", get(handle_list))
            .route("/v1/health", get(handle_health))
            .route("/v1/status", get(handle_status))
            .route("/v1/metrics", get(handle_metrics))
            .route("/v1/topology", get(handle_topology))
            .route("/v1/gossip/message", post(handle_gossip_message))
            .route("/v1/bootstrap", post(handle_bootstrap))
            .route("/v1/internal/sync", post(handle_sync))
            .layer(DefaultBodyLimit::max(MAX_VALUE_SIZE + 1))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            // route_layer (not layer): runs after route matching, so `MatchedPath`
            // is already present in the request's extensions inside `track_latency`.
            .route_layer(middleware::from_fn_with_state(state.clone(), track_latency))
            .with_state(state)
    }

    /// Runs the server, signalling `ready_tx` with the bound address once
    /// accepting connections, and draining in-flight requests for up to
    /// `DRAIN_WINDOW` on shutdown.
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        let workers = self.state.spawn_background_workers();
        let app = Self::create_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.address).await?;
        let local_addr = listener.local_addr()?;
        ready_tx.send(local_addr).ok();
        info!(address = %local_addr, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tokio::time::timeout(DRAIN_WINDOW, async {
            for worker in workers {
                worker.abort();
            }
        })
        .await
        .ok();
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Counts requests and observes latency into `/v1/metrics`, both labeled by
/// the route pattern (e.g. `/v1/data/:key`) rather than the literal path, so
/// distinct keys don't each mint their own series.
async fn track_latency(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();
    let response = next.run(request).await;
    state.metrics.requests_total.with_label_values(&[&route]).inc();
    state.metrics.request_latency_seconds.with_label_values(&[&route]).observe(start.elapsed().as_secs_f64());
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn repram_error_response(err: RepramError) -> Response {
    match err {
        RepramError::InvalidInput(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        RepramError::KeyTooLarge(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        RepramError::ValueTooLarge(_) => error_response(StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
        RepramError::StorageFull => error_response(StatusCode::INSUFFICIENT_STORAGE, err.to_string()),
        RepramError::KeyNotFound(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        RepramError::MissingHeader(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        RepramError::NetworkError(_) | RepramError::HttpError(_, _) => {
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
        RepramError::AuthReject => error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    }
}

fn extract_ttl(headers: &HeaderMap, query: &HashMap<String, String>) -> Result<u64, Response> {
    if let Some(v) = headers.get("x-ttl") {
        return v
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "X-TTL must be a non-negative integer"));
    }
    if let Some(s) = query.get("ttl") {
        return s
            .parse::<u64>()
            .map_err(|_| error_response(StatusCode::BAD_REQUEST, "ttl query parameter must be a non-negative integer"));
    }
    Err(error_response(StatusCode::BAD_REQUEST, "TTL is required via X-TTL header or ttl query parameter"))
}

/// PUT /v1/data/{key} — TTL via header (wins) or query; 201 on quorum, 202 on
/// local-only, 4xx on invalid input, 413 oversize, 507 when the store is full.
pub async fn handle_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests_served.fetch_add(1, Ordering::Relaxed);

    if key.len() > MAX_KEY_SIZE {
        return repram_error_response(RepramError::KeyTooLarge(MAX_KEY_SIZE));
    }
    if body.len() > MAX_VALUE_SIZE {
        return repram_error_response(RepramError::ValueTooLarge(MAX_VALUE_SIZE));
    }

    let ttl_secs = match extract_ttl(&headers, &query) {
        Ok(ttl) => ttl,
        Err(response) => return response,
    };

    match state.coordinator.put(&key, body.to_vec(), ttl_secs).await {
        Ok(result) => {
            let status = match result.outcome {
                WriteOutcome::Quorum => StatusCode::CREATED,
                WriteOutcome::Pending => StatusCode::ACCEPTED,
            };
            status.into_response()
        }
        Err(e) => repram_error_response(e),
    }
}

/// GET /v1/data/{key} — 200 with body and TTL metadata headers, 404 if
/// missing or expired.
pub async fn handle_get(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    state.requests_served.fetch_add(1, Ordering::Relaxed);

    if key.len() > MAX_KEY_SIZE {
        return repram_error_response(RepramError::KeyTooLarge(MAX_KEY_SIZE));
    }

    match state.store.get(&key).await {
        None => repram_error_response(RepramError::KeyNotFound(key)),
        Some((payload, meta)) => {
            let mut response = (StatusCode::OK, payload).into_response();
            insert_ttl_headers(response.headers_mut(), meta.created_at, meta.ttl_secs, meta.remaining_secs);
            response
        }
    }
}

/// HEAD /v1/data/{key} — same headers as GET, no body.
pub async fn handle_head(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    state.requests_served.fetch_add(1, Ordering::Relaxed);

    if key.len() > MAX_KEY_SIZE {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.store.head(&key).await {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(meta) => {
            let mut response = StatusCode::OK.into_response();
            insert_ttl_headers(response.headers_mut(), meta.created_at, meta.ttl_secs, meta.remaining_secs);
            response
        }
    }
}

fn insert_ttl_headers(headers: &mut axum::http::HeaderMap, created_at: u64, ttl_secs: u64, remaining_secs: u64) {
    headers.insert("x-created-at", HeaderValue::from_str(&created_at.to_string()).unwrap());
    headers.insert("x-original-ttl", HeaderValue::from_str(&ttl_secs.to_string()).unwrap());
    headers.insert("x-remaining-ttl", HeaderValue::from_str(&remaining_secs.to_string()).unwrap());
}

#[derive(Serialize, serde::Deserialize)]
struct ListResponse {
    keys: Vec<String>,
    next_cursor: Option<String>,
}

/// GET /v1/keys?prefix=&limit=&cursor=
pub async fn handle_list(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    state.requests_served.fetch_add(1, Ordering::Relaxed);

    let prefix = query.get("prefix").map(|s| s.as_str());
    let cursor = query.get("cursor").map(|s| s.as_str());
    let limit = query.get("limit").and_then(|s| s.parse::<usize>().ok());

    let (keys, next_cursor) = state.store.list(prefix, cursor, limit).await;
    Json(ListResponse { keys, next_cursor }).into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    enclave: String,
}

/// GET /v1/health
pub async fn handle_health(State(state): State<AppState>) -> Response {
    Json(HealthResponse { status: "ok", node_id: state.node_id.clone(), enclave: state.enclave.clone() }).into_response()
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    item_count: usize,
    bytes_in_use: usize,
    peer_count: usize,
    peer_joins_total: u64,
    peer_evictions_total: u64,
    requests_served: u64,
}

/// GET /v1/status
pub async fn handle_status(State(state): State<AppState>) -> Response {
    let (item_count, bytes_in_use) = state.store.stats().await;
    let peer_count = state.gossip.registry.len().await;
    let (peer_joins_total, peer_evictions_total) = state.gossip.registry.counters().await;
    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        item_count,
        bytes_in_use,
        peer_count,
        peer_joins_total,
        peer_evictions_total,
        requests_served: state.requests_served.load(Ordering::Relaxed),
    })
    .into_response()
}

/// GET /v1/metrics — Prometheus text exposition format.
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    let (item_count, bytes_in_use) = state.store.stats().await;
    state.metrics.storage_items.set(item_count as f64);
    state.metrics.storage_bytes.set(bytes_in_use as f64);
    state.metrics.peers_active.set(state.gossip.registry.len().await as f64);
    state.metrics.encode().into_response()
}

#[derive(Serialize)]
struct TopologyEntry {
    node_id: String,
    address: String,
    enclave: String,
}

/// GET /v1/topology
pub async fn handle_topology(State(state): State<AppState>) -> Response {
    let peers: Vec<TopologyEntry> = state
        .gossip
        .registry
        .all()
        .await
        .into_iter()
        .map(|p| TopologyEntry { node_id: p.node_id, address: p.address, enclave: p.enclave })
        .collect();
    Json(peers).into_response()
}

/// POST /v1/gossip/message — internal, applies a replicated write.
pub async fn handle_gossip_message(State(state): State<AppState>, Json(message): Json<GossipMessage>) -> Response {
    match state.gossip.receive(message).await {
        Ok(()) => Json(repram_common::GossipAck { acked: true }).into_response(),
        Err(RepramError::AuthReject) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => repram_error_response(e),
    }
}

/// POST /v1/bootstrap — internal, peer-list exchange.
pub async fn handle_bootstrap(State(state): State<AppState>, Json(request): Json<BootstrapRequest>) -> Response {
    match state.gossip.handle_bootstrap(request).await {
        Ok(response) => Json(response).into_response(),
        Err(RepramError::AuthReject) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => repram_error_response(e),
    }
}

/// POST /v1/internal/sync — internal, topology propagation.
pub async fn handle_sync(State(state): State<AppState>, Json(sync): Json<repram_common::SyncMessage>) -> Response {
    match state.gossip.handle_sync(sync).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(RepramError::AuthReject) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => repram_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(&NodeConfig {
            node_id: "test-node".to_string(),
            address: "127.0.0.1:0".to_string(),
            enclave: "default".to_string(),
            max_storage_bytes: 1 << 20,
            min_ttl_secs: 1,
            max_ttl_secs: 86_400,
            write_timeout: Duration::from_secs(5),
            replication_factor: 3,
            cluster_secret: None,
            fanout_threshold: 10,
            cap_dedup: 1000,
        })
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_http() {
        let app = Server::create_router(test_state());

        let put_request = Request::builder()
            .method("PUT")
            .uri("/v1/data/fade?ttl=60")
            .body(Body::from("hello"))
            .unwrap();
        let put_response = app.clone().oneshot(put_request).await.unwrap();
        assert_eq!(put_response.status(), StatusCode::CREATED);

        let get_request = Request::builder().method("GET").uri("/v1/data/fade").body(Body::empty()).unwrap();
        let get_response = app.oneshot(get_request).await.unwrap();
        assert_eq!(get_response.status(), StatusCode::OK);
        assert!(get_response.headers().contains_key("x-remaining-ttl"));
    }

    #[tokio::test]
    async fn missing_ttl_is_rejected() {
        let app = Server::create_router(test_state());
        let request = Request::builder().method("PUT").uri("/v1/data/fade").body(Body::from("hello")).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_key_is_404() {
        let app = Server::create_router(test_state());
        let request = Request::builder().method("GET").uri("/v1/data/nope").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn header_ttl_wins_over_query_ttl() {
        let app = Server::create_router(test_state());
        let request = Request::builder()
            .method("PUT")
            .uri("/v1/data/fade?ttl=10")
            .header("x-ttl", "120")
            .body(Body::from("hello"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-original-ttl").unwrap(), "120");
    }

    #[tokio::test]
    async fn oversize_key_is_rejected() {
        let app = Server::create_router(test_state());
        let huge_key = "k".repeat(MAX_KEY_SIZE + 1);
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/v1/data/{huge_key}?ttl=60"))
            .body(Body::from("hello"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_status_endpoints_respond() {
        let app = Server::create_router(test_state());
        let request = Request::builder().method("GET").uri("/v1/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder().method("GET").uri("/v1/status").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let app = Server::create_router(test_state());
        let request = Request::builder().method("GET").uri("/v1/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_returns_prefix_filtered_keys() {
        let app = Server::create_router(test_state());
        for key in ["a-1", "a-2", "b-1"] {
            let request = Request::builder()
                .method("PUT")
                .uri(format!("/v1/data/{key}?ttl=60"))
                .body(Body::from("v"))
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        let request = Request::builder().method("GET").uri("/v1/keys?prefix=a-").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.keys.len(), 2);
    }
}
