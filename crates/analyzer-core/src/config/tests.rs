use std::path::PathBuf;

use super::types::AnalyzerConfig;

#[test]
fn defaults_pass_validation() {
    AnalyzerConfig::default().validate().expect("defaults valid");
}

#[test]
fn file_layer_overrides_only_what_it_names() {
    let mut cfg = AnalyzerConfig::default();
    cfg.apply_file_str(
        r#"
        [ingest]
        path = "flows.ndjson"

        [detection]
        scan_min_targets = 30
        cv_threshold = 0.2
        auth_ports = [22, 3389]

        [scoring]
        alert_score_threshold = 2.0

        [scoring.weights]
        scanning = 1.5

        [pipeline]
        shards = 8

        [state]
        baselines_path = "/var/lib/flowsentry/baselines.bin"
        "#,
    )
    .expect("valid toml");

    assert_eq!(cfg.input_path, Some(PathBuf::from("flows.ndjson")));
    assert_eq!(cfg.detection.scan_min_targets, 30);
    assert_eq!(cfg.detection.cv_threshold, 0.2);
    assert_eq!(cfg.detection.auth_ports, vec![22, 3389]);
    assert_eq!(cfg.scoring.alert_score_threshold, 2.0);
    assert_eq!(cfg.scoring.weights.scanning, 1.5);
    assert_eq!(cfg.scoring.weights.beaconing, 1.0);
    assert_eq!(cfg.pipeline.shards, 8);
    assert_eq!(
        cfg.state.baselines_path,
        PathBuf::from("/var/lib/flowsentry/baselines.bin")
    );
    // Untouched sections keep their defaults.
    assert_eq!(cfg.detection.c2_min_flows, 10);
    assert_eq!(cfg.pipeline.channel_capacity, 1024);
}

#[test]
fn malformed_toml_is_an_error() {
    let mut cfg = AnalyzerConfig::default();
    assert!(cfg.apply_file_str("[detection\nscan_min_targets = ").is_err());
}

#[test]
fn env_layer_wins_over_file_layer() {
    let mut cfg = AnalyzerConfig::default();
    cfg.apply_file_str("[detection]\nscan_min_targets = 30\n")
        .expect("valid toml");

    std::env::set_var("FLOWSENTRY_SCAN_MIN_TARGETS", "40");
    std::env::set_var("FLOWSENTRY_AUTH_PORTS", "22, 23");
    cfg.apply_env_overrides();
    std::env::remove_var("FLOWSENTRY_SCAN_MIN_TARGETS");
    std::env::remove_var("FLOWSENTRY_AUTH_PORTS");

    assert_eq!(cfg.detection.scan_min_targets, 40);
    assert_eq!(cfg.detection.auth_ports, vec![22, 23]);
}

#[test]
fn percentile_outside_unit_interval_fails_validation() {
    let mut cfg = AnalyzerConfig::default();
    cfg.detection.rarity_percentile = 1.0;
    assert!(cfg.validate().is_err());

    cfg.detection.rarity_percentile = 0.01;
    cfg.detection.staging_percentile = 0.0;
    assert!(cfg.validate().is_err());
}

#[test]
fn non_finite_thresholds_fail_validation() {
    let mut cfg = AnalyzerConfig::default();
    cfg.detection.exfil_sigma = f64::NAN;
    assert!(cfg.validate().is_err());

    let mut cfg = AnalyzerConfig::default();
    cfg.scoring.alert_score_threshold = f64::INFINITY;
    assert!(cfg.validate().is_err());
}

#[test]
fn zero_shards_fail_validation() {
    let mut cfg = AnalyzerConfig::default();
    cfg.pipeline.shards = 0;
    assert!(cfg.validate().is_err());
}
