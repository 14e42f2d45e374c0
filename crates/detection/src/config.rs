//! Detector thresholds. Every trigger condition is driven from here;
//! nothing is hardcoded in the detector modules.

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Tumbling window span shared by the per-pair groupings.
    pub window_span_secs: i64,
    /// Records older than `max_observed - tolerance` are rejected.
    pub reorder_tolerance_secs: i64,
    /// Buckets below this count are "insufficient baseline"; detectors
    /// abstain rather than divide by a zero-ish stddev.
    pub min_sample: u64,

    pub min_count: usize,
    pub cv_threshold: f64,

    pub exfil_sigma: f64,
    pub exfil_min_run: usize,

    pub scan_max_gap_secs: i64,
    pub scan_min_targets: usize,

    pub c2_min_flows: usize,
    pub c2_max_bytes_out: f64,
    pub c2_entropy_max: f64,

    pub rarity_percentile: f64,

    pub burst_threshold_seconds: i64,
    pub novelty_min_run: usize,

    pub bruteforce_min_attempts: usize,
    pub bruteforce_max_duration_ms: f64,
    pub bruteforce_max_bytes_in: f64,
    pub auth_ports: Vec<u16>,

    pub staging_min_sources: usize,
    pub staging_percentile: f64,
    pub dga_entropy_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_span_secs: 3_600,
            reorder_tolerance_secs: 30,
            min_sample: 3,
            min_count: 6,
            cv_threshold: 0.3,
            exfil_sigma: 3.0,
            exfil_min_run: 3,
            scan_max_gap_secs: 600,
            scan_min_targets: 15,
            c2_min_flows: 10,
            c2_max_bytes_out: 200.0,
            c2_entropy_max: 2.5,
            rarity_percentile: 0.01,
            burst_threshold_seconds: 5,
            novelty_min_run: 3,
            bruteforce_min_attempts: 20,
            bruteforce_max_duration_ms: 2_000.0,
            bruteforce_max_bytes_in: 500.0,
            auth_ports: vec![21, 22, 23, 3389, 5900],
            staging_min_sources: 3,
            staging_percentile: 0.95,
            dga_entropy_threshold: 3.5,
        }
    }
}
