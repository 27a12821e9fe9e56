use std::time::Duration;

/// How often the background sweeper walks the store removing expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive ping failures after which a peer is evicted from the registry.
pub const N_FAIL: u32 = 3;

/// Cadence of the health-probe and topology-sync background tasks.
pub const T_PING: Duration = Duration::from_secs(30);
pub const T_SYNC: Duration = Duration::from_secs(30);

/// Per-call timeout for a gossip Send (ping, forward, bootstrap, sync).
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Same-enclave peer count at or below which a write is forwarded to every
/// peer; above it, forwarding degrades to a random subset of size ceil(sqrt(P)).
pub const FANOUT_THRESHOLD: usize = 10;

/// Maximum number of entries the dedup cache retains before it evicts.
pub const CAP_DEDUP: usize = 100_000;

/// Default deadline for the quorum wait in the Coordinator's Put flow.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bounds on caller-supplied TTLs, in seconds.
pub const DEFAULT_MIN_TTL_SECS: u64 = 300;
pub const DEFAULT_MAX_TTL_SECS: u64 = 86_400;

/// Default replication factor (upper bound on quorum size).
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// How long graceful shutdown waits for in-flight requests to drain.
pub const DRAIN_WINDOW: Duration = Duration::from_secs(10);
