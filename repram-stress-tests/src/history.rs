use std::collections::HashMap;
use std::time::Instant;

pub enum OpKind {
    Put,
    Get,
}

pub enum OpOutcome {
    /// The PUT was accepted (with or without quorum). `value` is what was
    /// written, needed for correctness checking.
    PutOk { value: Vec<u8>, quorum: bool },
    GetOk { value: Vec<u8> },
    NotFound,
    /// 5xx or network failure.
    Error,
}

pub struct OpRecord {
    /// When the client sent the request.
    pub client_start_ts: Instant,
    /// When the client received the response (the ACK).
    pub client_ack_ts: Instant,
    pub key: String,
    pub kind: OpKind,
    pub outcome: OpOutcome,
}

pub struct History(pub Vec<OpRecord>);

/// REPRAM carries no version or vector clock, so the only properties a GET
/// can violate are: returning bytes no PUT ever wrote for that key, or
/// returning bytes before the matching PUT could plausibly have reached any
/// node. Overwrite ordering and cross-node staleness are not checked here —
/// last-acquirer-of-the-writer-lock-wins means two concurrent PUTs to the
/// same key have no defined winner, and gossip propagation has no bound
/// tight enough to flag a GET as "too early" once its matching PUT has
/// started anywhere in the cluster.
pub enum ViolationKind {
    /// GET returned bytes that no PUT for this key ever wrote.
    UnknownValueReturned { actual: Vec<u8> },
    /// Every PUT that could have produced the returned bytes started after
    /// this GET's response was already back at the client — the value could
    /// not have existed on any node yet.
    ReadBeforeWriteStart { put_start_ts: Instant, get_ack_ts: Instant },
}

pub struct Violation {
    pub key: String,
    pub kind: ViolationKind,
}

/// Entry in the write index.
struct PutEntry {
    value: Vec<u8>,
    put_start_ts: Instant,
}

impl History {
    /// Check every successful GET against the write index. Returns one
    /// [`Violation`] per inconsistent GET. GETs that returned `NotFound` are
    /// not checked — under gossip propagation a transient miss on a node
    /// that hasn't yet received a write is expected, not a violation.
    pub fn check_correctness(&self) -> Vec<Violation> {
        let write_index = build_write_index(&self.0);

        self.0
            .iter()
            .filter_map(|r| {
                if let OpOutcome::GetOk { value } = &r.outcome {
                    classify_get(value, r.client_ack_ts, write_index.get(&r.key))
                        .map(|kind| Violation { key: r.key.clone(), kind })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// key → every PUT issued against it, in the order they were recorded.
fn build_write_index(records: &[OpRecord]) -> HashMap<String, Vec<PutEntry>> {
    let mut index: HashMap<String, Vec<PutEntry>> = HashMap::new();
    for r in records {
        if let OpOutcome::PutOk { value, .. } = &r.outcome {
            index.entry(r.key.clone()).or_default().push(PutEntry {
                value: value.clone(),
                put_start_ts: r.client_start_ts,
            });
        }
    }
    index
}

/// Returns the violation kind for a single GET result, or `None` if it is consistent.
fn classify_get(
    value: &[u8],
    get_ack: Instant,
    entries: Option<&Vec<PutEntry>>,
) -> Option<ViolationKind> {
    let matching: Vec<&PutEntry> = entries
        .into_iter()
        .flatten()
        .filter(|e| e.value == value)
        .collect();

    if matching.is_empty() {
        return Some(ViolationKind::UnknownValueReturned { actual: value.to_vec() });
    }

    // At least one matching PUT must have started no later than this GET
    // was acked — otherwise the bytes could not have existed anywhere yet.
    if matching.iter().any(|e| e.put_start_ts <= get_ack) {
        return None;
    }

    let earliest = matching.iter().min_by_key(|e| e.put_start_ts).unwrap();
    Some(ViolationKind::ReadBeforeWriteStart {
        put_start_ts: earliest.put_start_ts,
        get_ack_ts: get_ack,
    })
}
