use rand::Rng;
use repram_client::{Client, ClientConfig, PutOutcome};
use repram_common::RepramError;
use std::time::{Duration, Instant};

use crate::history::{History, OpKind, OpOutcome, OpRecord};
use crate::metrics::Metrics;
use crate::workload::{Op, WorkloadProfile};

/// TTL handed to every PUT. Comfortably above any stress run's duration and
/// at the node's default minimum, so no entry expires mid-run.
const PUT_TTL_SECS: u64 = 300;

/// Drive `node_addrs` with `profile` for `duration`, recording every operation.
/// Each request targets a node picked uniformly at random from `node_addrs`,
/// which exercises cross-node propagation rather than pinning the workload
/// to a single node's local view. Returns raw metrics and the full operation
/// history for post-run correctness checking.
pub async fn run(
    node_addrs: Vec<String>,
    profile: WorkloadProfile,
    key_space: usize,
    duration: Duration,
) -> (Metrics, History) {
    assert!(!node_addrs.is_empty(), "worker requires at least one node address");

    let mut client = Client::new(ClientConfig { node_addr: node_addrs[0].clone() });
    let mut rng = rand::thread_rng();
    let mut records: Vec<OpRecord> = Vec::new();
    let mut requests_total: u64 = 0;
    let mut errors_5xx: u64 = 0;
    let mut pending_puts: u64 = 0;
    let mut latency_ns: Vec<u64> = Vec::new();

    let run_start = Instant::now();

    while run_start.elapsed() < duration {
        let op = profile.sample(&mut rng);
        let key_idx = rng.gen_range(0..key_space);
        let key = format!("key_{key_idx}");

        let target = &node_addrs[rng.gen_range(0..node_addrs.len())];
        client.set_target(target);

        let op_start = Instant::now();
        let (kind, outcome) = execute_op(&client, op, &key, &mut rng).await;
        let op_end = Instant::now();

        if is_error(&outcome) {
            errors_5xx += 1;
        }
        if matches!(outcome, OpOutcome::PutOk { quorum: false, .. }) {
            pending_puts += 1;
        }

        requests_total += 1;
        latency_ns.push((op_end - op_start).as_nanos() as u64);
        records.push(OpRecord {
            client_start_ts: op_start,
            client_ack_ts: op_end,
            key,
            kind,
            outcome,
        });
    }

    let elapsed_secs = run_start.elapsed().as_secs_f64();
    let metrics = Metrics { requests_total, errors_5xx, pending_puts, latency_ns, elapsed_secs };
    (metrics, History(records))
}

async fn execute_op(
    client: &Client,
    op: Op,
    key: &str,
    rng: &mut impl Rng,
) -> (OpKind, OpOutcome) {
    match op {
        Op::Get => {
            let outcome = match client.get(key).await {
                Ok(r) => OpOutcome::GetOk { value: r.value },
                Err(RepramError::KeyNotFound(_)) => OpOutcome::NotFound,
                Err(_) => OpOutcome::Error,
            };
            (OpKind::Get, outcome)
        }
        Op::Put => {
            let value = generate_value(rng);
            let outcome = match client.put(key, &value, PUT_TTL_SECS).await {
                Ok(PutOutcome::Quorum) => OpOutcome::PutOk { value, quorum: true },
                Ok(PutOutcome::Pending) => OpOutcome::PutOk { value, quorum: false },
                Err(_) => OpOutcome::Error,
            };
            (OpKind::Put, outcome)
        }
    }
}

/// Generate a random byte payload for use in PUT operations (8–1024 bytes).
pub fn generate_value(rng: &mut impl Rng) -> Vec<u8> {
    let len: usize = rng.gen_range(8..=1024);
    (0..len).map(|_| rng.gen::<u8>()).collect()
}

/// Returns `true` if `outcome` represents a server-side error (5xx or network failure).
pub fn is_error(outcome: &OpOutcome) -> bool {
    matches!(outcome, OpOutcome::Error)
}
