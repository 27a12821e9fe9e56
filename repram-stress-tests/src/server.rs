use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

pub struct ServerProcess {
    child: Child,
    pub node_id: String,
    pub addr: SocketAddr,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.child.kill().ok();
    }
}

/// An N-node REPRAM cluster, all in the same enclave. `nodes[0]` is the
/// bootstrap seed every other node was started with; there is no
/// primary/replica distinction beyond that — any node accepts reads and
/// writes.
pub struct Cluster {
    pub nodes: Vec<ServerProcess>,
    pub enclave: String,
}

impl Cluster {
    /// `host:port` of every node, suitable for `repram_client::ClientConfig`.
    pub fn addrs(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.addr.to_string()).collect()
    }
}

/// Reserve `count` free TCP ports by binding to port 0 for each, then
/// releasing them all at once. Holding all listeners alive until the ports
/// are collected prevents the same port from being issued twice and reduces
/// the TOCTOU window between releasing and the caller binding.
pub fn pick_free_ports(count: usize) -> Vec<u16> {
    let listeners: Vec<std::net::TcpListener> = (0..count)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let ports = listeners.iter().map(|l| l.local_addr().unwrap().port()).collect();
    drop(listeners);
    ports
}

/// Return the path to the `repram-server` binary that sits alongside this
/// executable in `target/debug/` (or `target/debug/deps/` when run as a test).
fn server_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().expect("cannot determine own executable path");
    path.pop(); // remove own filename
    if path.file_name().map(|n| n == "deps").unwrap_or(false) {
        path.pop(); // step out of target/debug/deps → target/debug/
    }
    path.push("repram-server");
    path
}

const READY_TIMEOUT: Duration = Duration::from_secs(30);

impl Cluster {
    /// Build the `repram-server` binary, spawn `node_count` nodes in a single
    /// enclave, wait until every node is ready to serve HTTP, and return the
    /// live `Cluster`.
    ///
    /// `nodes[0]` starts with no bootstrap peers; every other node is given
    /// `nodes[0]`'s advertised address as its sole bootstrap peer, and learns
    /// the rest of the cluster from SYNC broadcasts once running.
    ///
    /// Returns `Err` if the build fails, a process cannot be spawned, or the
    /// readiness deadline elapses.
    pub fn build_and_spawn(node_count: usize) -> Result<Self, String> {
        assert!(node_count > 0, "a cluster needs at least one node");

        let status = Command::new("cargo")
            .args(["build", "-p", "repram-server"])
            .status()
            .map_err(|e| format!("Failed to invoke cargo build: {e}"))?;
        if !status.success() {
            return Err(format!("cargo build -p repram-server failed: {status}"));
        }

        let enclave = "stress".to_string();
        let ports = pick_free_ports(node_count);
        let addrs: Vec<SocketAddr> = ports
            .iter()
            .map(|p| format!("127.0.0.1:{p}").parse().unwrap())
            .collect();
        let node_ids: Vec<String> = (0..node_count).map(|i| format!("stress-{i}")).collect();

        let server_bin = server_binary_path();
        let seed_addr = addrs[0].to_string();

        let mut nodes = Vec::with_capacity(node_count);
        for i in 0..node_count {
            let mut cmd = Command::new(&server_bin);
            cmd.args([
                "--http-port",
                &ports[i].to_string(),
                "--advertised-addr",
                &addrs[i].to_string(),
                "--node-id",
                &node_ids[i],
                "--enclave",
                &enclave,
            ]);
            if i > 0 {
                cmd.args(["--bootstrap-peers", &seed_addr]);
            }
            let child = cmd.spawn().map_err(|e| format!("Failed to spawn {}: {e}", node_ids[i]))?;
            nodes.push(ServerProcess { child, node_id: node_ids[i].clone(), addr: addrs[i] });
        }

        // Poll every node for HTTP readiness concurrently. If any poll fails,
        // the whole `nodes` vec drops here, killing every spawned process.
        let deadline = Instant::now() + READY_TIMEOUT;
        let handles: Vec<_> = nodes
            .iter()
            .map(|n| {
                let addr = n.addr;
                let node_id = n.node_id.clone();
                std::thread::spawn(move || (node_id, poll_until_ready(addr, deadline)))
            })
            .collect();

        for h in handles {
            let (node_id, result) = h.join().map_err(|_| "readiness thread panicked".to_string())?;
            result.map_err(|e| format!("{node_id} not ready within timeout: {e}"))?;
        }

        Ok(Cluster { nodes, enclave })
    }
}

/// Poll `addr` with a TCP connect attempt until the connection succeeds
/// (server is accepting connections) or `deadline` is reached.
///
/// A successful TCP connection is sufficient to confirm the HTTP server is
/// ready: our axum-based server starts accepting the moment it binds, so a
/// successful `connect` implies it will also answer HTTP requests.
fn poll_until_ready(addr: SocketAddr, deadline: Instant) -> Result<(), String> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(format!("timed out waiting for {addr}"));
        }
        let probe = Duration::min(remaining, Duration::from_millis(200));
        if TcpStream::connect_timeout(&addr, probe).is_ok() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
