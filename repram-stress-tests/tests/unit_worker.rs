use rand::{rngs::StdRng, SeedableRng};
use repram_stress_tests::history::OpOutcome;
use repram_stress_tests::worker::{generate_value, is_error};

// `worker::run` requires a live HTTP server and is inherently integration-level.
// The two helpers exposed by worker.rs cover all of the pure, testable logic.

#[test]
fn generate_value_stays_in_range_and_varies() {
    let mut rng = StdRng::seed_from_u64(42);

    let mut all_same = true;
    let mut prev: Option<Vec<u8>> = None;
    for _ in 0..50 {
        let v = generate_value(&mut rng);
        assert!(v.len() >= 8, "value too short: {}", v.len());
        assert!(v.len() <= 1024, "value too long: {}", v.len());
        if let Some(ref p) = prev {
            if p != &v {
                all_same = false;
            }
        }
        prev = Some(v);
    }
    assert!(!all_same, "generate_value returned identical bytes every time");
}

#[test]
fn is_error_only_flags_the_error_outcome() {
    assert!(is_error(&OpOutcome::Error));
    assert!(!is_error(&OpOutcome::NotFound));
    assert!(!is_error(&OpOutcome::GetOk { value: vec![1] }));
    assert!(!is_error(&OpOutcome::PutOk { value: vec![1], quorum: true }));
    assert!(!is_error(&OpOutcome::PutOk { value: vec![1], quorum: false }));
}
