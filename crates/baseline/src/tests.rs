use std::sync::Arc;

use proptest::prelude::*;

use super::*;

#[test]
fn bucket_variance_zero_for_single_sample() {
    let mut bucket = BucketStats::default();
    bucket.observe(42.0);
    assert_eq!(bucket.count, 1);
    assert_eq!(bucket.mean, 42.0);
    assert_eq!(bucket.variance(), 0.0);
    assert_eq!(bucket.stddev(), 0.0);
}

#[test]
fn bucket_matches_known_sample_variance() {
    let mut bucket = BucketStats::default();
    for v in [90.0, 100.0, 110.0] {
        bucket.observe(v);
    }
    assert_eq!(bucket.count, 3);
    assert!((bucket.mean - 100.0).abs() < 1e-9);
    assert!((bucket.variance() - 100.0).abs() < 1e-9);
    assert!((bucket.stddev() - 10.0).abs() < 1e-9);
}

#[test]
fn store_update_and_get() {
    let store = BaselineStore::new();
    assert!(store.get("hourly", "10.0.0.5|09").is_none());

    store.update("hourly", "10.0.0.5|09", 100.0);
    let stats = store.update("hourly", "10.0.0.5|09", 200.0);
    assert_eq!(stats.count, 2);
    assert!((stats.mean - 150.0).abs() < 1e-9);
    assert_eq!(store.len(), 1);
}

#[test]
fn category_totals_ignore_other_categories() {
    let store = BaselineStore::new();
    store.update("proto_port", "tcp/443", 1.0);
    store.update("proto_port", "tcp/443", 1.0);
    store.update("proto_port", "udp/53", 1.0);
    store.update("hourly", "10.0.0.5|09", 4096.0);

    assert_eq!(store.category_total("proto_port"), 3);
    let snapshot = store.category_snapshot("proto_port");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].0, "tcp/443");
    assert_eq!(snapshot[0].1.count, 2);
}

#[test]
fn baseline_snapshot_roundtrip_is_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("baselines.bin");

    let store = BaselineStore::new();
    for v in [10.0, 11.5, 13.25, 9.75] {
        store.update("hourly", "10.0.0.5|09", v);
    }
    store.update("proto_port", "tcp/443", 1.0);
    store.save(&path).expect("save");

    let loaded = BaselineStore::load(&path).expect("load");
    assert_eq!(loaded.len(), 2);
    let orig = store.get("hourly", "10.0.0.5|09").unwrap();
    let back = loaded.get("hourly", "10.0.0.5|09").unwrap();
    // m2 is persisted directly, so the recurrence continues bit-exactly.
    assert_eq!(orig, back);
}

#[test]
fn missing_snapshot_is_distinguished_from_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.bin");
    match BaselineStore::load(&missing) {
        Err(StoreError::Missing(path)) => assert_eq!(path, missing),
        other => panic!("expected Missing, got {:?}", other.map(|s| s.len())),
    }

    let corrupt = dir.path().join("corrupt.bin");
    std::fs::write(&corrupt, b"not a snapshot").expect("write");
    assert!(matches!(
        BaselineStore::load(&corrupt),
        Err(StoreError::Corrupt(_))
    ));
    assert!(matches!(
        NoveltyStore::load(&corrupt),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn novelty_record_is_atomic_check_then_insert() {
    let store = NoveltyStore::new();
    assert!(!store.seen(NoveltyCategory::DstIp, "203.0.113.9"));
    assert!(store.record(NoveltyCategory::DstIp, "203.0.113.9"));
    assert!(!store.record(NoveltyCategory::DstIp, "203.0.113.9"));
    assert!(store.seen(NoveltyCategory::DstIp, "203.0.113.9"));
    assert_eq!(store.len(NoveltyCategory::DstIp), 1);
    assert_eq!(store.len(NoveltyCategory::Domain), 0);
}

#[test]
fn novelty_record_no_lost_updates_under_contention() {
    let store = Arc::new(NoveltyStore::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.record(NoveltyCategory::Domain, "contended.example")
        }));
    }
    let inserted: usize = handles
        .into_iter()
        .map(|h| h.join().expect("join") as usize)
        .sum();
    assert_eq!(inserted, 1);
    assert_eq!(store.len(NoveltyCategory::Domain), 1);
}

#[test]
fn bootstrap_horizon_opens_once() {
    let store = NoveltyStore::new();
    assert!(store.in_bootstrap(1_700_000_000));

    assert!(store.observe_clock(1_700_000_000));
    assert!(!store.observe_clock(1_700_090_000));

    assert_eq!(store.bootstrap_until(), Some(1_700_000_000 + BOOTSTRAP_HORIZON_SECS));
    assert!(store.in_bootstrap(1_700_000_000 + BOOTSTRAP_HORIZON_SECS - 1));
    assert!(!store.in_bootstrap(1_700_000_000 + BOOTSTRAP_HORIZON_SECS));
}

#[test]
fn novelty_snapshot_roundtrip_preserves_horizon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("novelty.bin");

    let store = NoveltyStore::new();
    store.observe_clock(1_700_000_000);
    store.record(NoveltyCategory::DstIp, "10.0.0.7");
    store.record(NoveltyCategory::Domain, "internal.example");
    store.save(&path).expect("save");

    let loaded = NoveltyStore::load(&path).expect("load");
    assert_eq!(loaded.bootstrap_until(), store.bootstrap_until());
    assert!(loaded.seen(NoveltyCategory::DstIp, "10.0.0.7"));
    assert!(loaded.seen(NoveltyCategory::Domain, "internal.example"));
    // Day-2 traffic to a day-1 destination is not novel after reload.
    assert!(!loaded.in_bootstrap(1_700_000_000 + BOOTSTRAP_HORIZON_SECS + 10));
    assert!(loaded.seen(NoveltyCategory::DstIp, "10.0.0.7"));
}

fn two_pass_mean_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (mean, ss / (n - 1.0))
}

proptest! {
    #[test]
    fn welford_agrees_with_two_pass(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)) {
        let mut bucket = BucketStats::default();
        for &v in &values {
            bucket.observe(v);
        }
        let (mean, variance) = two_pass_mean_variance(&values);
        let tol = 1e-6 * mean.abs().max(1.0);
        prop_assert!((bucket.mean - mean).abs() <= tol);
        let vtol = 1e-6 * variance.abs().max(1.0);
        prop_assert!((bucket.variance() - variance).abs() <= vtol);
    }
}
