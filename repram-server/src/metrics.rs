//! Prometheus metric registration and scrape-format rendering for `/v1/metrics`.

use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub peers_active: Gauge,
    pub peer_joins_total: IntCounter,
    pub peer_evictions_total: IntCounter,
    pub ping_failures_total: IntCounter,
    /// Labeled by route (e.g. `/v1/data/:key`), not by the raw request path.
    pub requests_total: IntCounterVec,
    /// Labeled by route, same label set as `requests_total`.
    pub request_latency_seconds: HistogramVec,
    pub storage_items: Gauge,
    pub storage_bytes: Gauge,
    pub gossip_auth_rejections_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let peers_active = Gauge::with_opts(Opts::new(
            "repram_peers_active",
            "Number of peers currently in the registry",
        ))
        .unwrap();
        let peer_joins_total = IntCounter::with_opts(Opts::new(
            "repram_peer_joins_total",
            "Total number of peer joins observed",
        ))
        .unwrap();
        let peer_evictions_total = IntCounter::with_opts(Opts::new(
            "repram_peer_evictions_total",
            "Total number of peer evictions due to failed health checks",
        ))
        .unwrap();
        let ping_failures_total = IntCounter::with_opts(Opts::new(
            "repram_ping_failures_total",
            "Total number of failed health-probe pings",
        ))
        .unwrap();
        let requests_total = IntCounterVec::new(
            Opts::new("repram_requests_total", "Total number of HTTP requests served"),
            &["route"],
        )
        .unwrap();
        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new("repram_request_latency_seconds", "Request latency in seconds"),
            &["route"],
        )
        .unwrap();
        let storage_items =
            Gauge::with_opts(Opts::new("repram_storage_items", "Live item count in the store")).unwrap();
        let storage_bytes =
            Gauge::with_opts(Opts::new("repram_storage_bytes", "Live payload bytes in the store")).unwrap();
        let gossip_auth_rejections_total = IntCounter::with_opts(Opts::new(
            "repram_gossip_auth_rejections_total",
            "Total number of gossip/bootstrap messages dropped for failing authentication",
        ))
        .unwrap();

        registry.register(Box::new(peers_active.clone())).unwrap();
        registry.register(Box::new(peer_joins_total.clone())).unwrap();
        registry.register(Box::new(peer_evictions_total.clone())).unwrap();
        registry.register(Box::new(ping_failures_total.clone())).unwrap();
        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(request_latency_seconds.clone())).unwrap();
        registry.register(Box::new(storage_items.clone())).unwrap();
        registry.register(Box::new(storage_bytes.clone())).unwrap();
        registry.register(Box::new(gossip_auth_rejections_total.clone())).unwrap();

        Self {
            registry,
            peers_active,
            peer_joins_total,
            peer_evictions_total,
            ping_failures_total,
            requests_total,
            request_latency_seconds,
            storage_items,
            storage_bytes,
            gossip_auth_rejections_total,
        }
    }

    /// Renders every registered metric in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer).expect("metric encoding cannot fail");
        String::from_utf8(buffer).expect("prometheus text encoder emits valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_contains_every_registered_metric_name() {
        let metrics = Metrics::new();
        metrics.peer_joins_total.inc();
        metrics.storage_items.set(3.0);
        metrics.requests_total.with_label_values(&["/v1/data/:key"]).inc();
        metrics.request_latency_seconds.with_label_values(&["/v1/data/:key"]).observe(0.01);
        let text = metrics.encode();
        assert!(text.contains("repram_peer_joins_total"));
        assert!(text.contains("repram_storage_items"));
        assert!(text.contains("repram_peers_active"));
        assert!(text.contains("repram_gossip_auth_rejections_total"));
        assert!(text.contains("repram_requests_total"));
        assert!(text.contains("repram_request_latency_seconds"));
    }

    #[test]
    fn requests_total_and_latency_are_labeled_per_route() {
        let metrics = Metrics::new();
        metrics.requests_total.with_label_values(&["/v1/data/:key"]).inc();
        metrics.requests_total.with_label_values(&["/v1/data/:key"]).inc();
        metrics.requests_total.with_label_values(&["/v1/health"]).inc();
        let text = metrics.encode();
        assert!(text.contains("route=\"/v1/data/:key\""));
        assert!(text.contains("route=\"/v1/health\""));
    }
}
