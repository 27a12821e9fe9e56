//! Fanout-set selection for epidemic forwarding (§4.2.4).
//!
//! Below the threshold every same-enclave peer is forwarded to (full
//! broadcast, O(P)); above it, forwarding degrades to a uniformly random
//! subset of size `ceil(sqrt(P))`, giving O(√N) cost per hop while the
//! dedup cache (not the hop count) bounds propagation.

use rand::seq::SliceRandom;

use super::registry::PeerRecord;

pub fn select_fanout<'a>(
    candidates: &'a [PeerRecord],
    threshold: usize,
    rng: &mut impl rand::Rng,
) -> Vec<&'a PeerRecord> {
    if candidates.len() <= threshold {
        return candidates.iter().collect();
    }
    let fanout_size = (candidates.len() as f64).sqrt().ceil() as usize;
    let mut pool: Vec<&PeerRecord> = candidates.iter().collect();
    pool.shuffle(rng);
    pool.truncate(fanout_size);
    pool
}
