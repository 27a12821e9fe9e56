use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use repram_server::{config, AppState, NodeConfig, Server};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// REPRAM node: ephemeral, gossip-replicated key-value store.
#[derive(Parser, Debug)]
#[command(name = "repram-server")]
struct Args {
    /// Local HTTP listen port.
    #[arg(long, env = "REPRAM_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Address advertised to peers for this node (host:port). Defaults to
    /// `127.0.0.1:<http_port>`.
    #[arg(long, env = "REPRAM_ADVERTISED_ADDR")]
    advertised_addr: Option<String>,

    /// Stable node identity. Auto-generated if unset.
    #[arg(long, env = "REPRAM_NODE_ID")]
    node_id: Option<String>,

    /// Replication-boundary name. Nodes only replicate data within the same enclave.
    #[arg(long, env = "REPRAM_ENCLAVE", default_value = "default")]
    enclave: String,

    /// Comma-separated `host:port` addresses to bootstrap from.
    #[arg(long, env = "REPRAM_BOOTSTRAP_PEERS", value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    /// Minimum TTL accepted on a PUT, in seconds.
    #[arg(long, env = "REPRAM_MIN_TTL_SECS", default_value_t = config::DEFAULT_MIN_TTL_SECS)]
    min_ttl_secs: u64,

    /// Maximum TTL accepted on a PUT, in seconds.
    #[arg(long, env = "REPRAM_MAX_TTL_SECS", default_value_t = config::DEFAULT_MAX_TTL_SECS)]
    max_ttl_secs: u64,

    /// Deadline the Coordinator waits for quorum before returning 202, in seconds.
    #[arg(long, env = "REPRAM_WRITE_TIMEOUT_SECS", default_value_t = 5)]
    write_timeout_secs: u64,

    /// Upper bound on quorum size / number of directly-replicated peers per write.
    #[arg(long, env = "REPRAM_REPLICATION_FACTOR", default_value_t = config::DEFAULT_REPLICATION_FACTOR)]
    replication_factor: usize,

    /// Shared secret for HMAC-authenticated gossip and bootstrap. Unset = open mode.
    #[arg(long, env = "REPRAM_CLUSTER_SECRET")]
    cluster_secret: Option<String>,

    /// Maximum live-payload bytes the store will hold.
    #[arg(long, env = "REPRAM_MAX_STORAGE_BYTES", default_value_t = 1_073_741_824)]
    max_storage_bytes: usize,

    /// Log verbosity, passed straight to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "REPRAM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let node_id = args.node_id.clone().unwrap_or_else(|| format!("node-{}", Uuid::new_v4()));
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", args.http_port).parse()?;
    let advertised_addr = args.advertised_addr.clone().unwrap_or_else(|| format!("127.0.0.1:{}", args.http_port));

    let node_config = NodeConfig {
        node_id: node_id.clone(),
        address: advertised_addr,
        enclave: args.enclave,
        max_storage_bytes: args.max_storage_bytes,
        min_ttl_secs: args.min_ttl_secs,
        max_ttl_secs: args.max_ttl_secs,
        write_timeout: Duration::from_secs(args.write_timeout_secs),
        replication_factor: args.replication_factor,
        cluster_secret: args.cluster_secret,
        fanout_threshold: config::FANOUT_THRESHOLD,
        cap_dedup: config::CAP_DEDUP,
    };

    let state = AppState::new(&node_config);

    for seed in &args.bootstrap_peers {
        if let Err(e) = state.gossip.bootstrap_from(seed).await {
            tracing::warn!(seed = %seed, error = %e, "bootstrap attempt failed");
        }
    }

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            tracing::info!(node_id = %node_id, %addr, "repram node ready");
        }
    });

    Server::new(bind_addr, state).run(ready_tx).await?;
    Ok(())
}
