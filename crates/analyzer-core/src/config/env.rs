use std::path::PathBuf;

use super::types::AnalyzerConfig;
use super::util::{env_non_empty, env_parse, split_ports};

impl AnalyzerConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        self.apply_env_ingest();
        self.apply_env_detection();
        self.apply_env_scoring();
        self.apply_env_pipeline();
        self.apply_env_state();
    }

    fn apply_env_ingest(&mut self) {
        if let Some(v) = env_non_empty("FLOWSENTRY_INPUT") {
            self.input_path = Some(PathBuf::from(v));
        }
    }

    fn apply_env_detection(&mut self) {
        if let Some(v) = env_parse("FLOWSENTRY_WINDOW_SPAN_SECS") {
            self.detection.window_span_secs = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_REORDER_TOLERANCE_SECS") {
            self.detection.reorder_tolerance_secs = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_MIN_SAMPLE") {
            self.detection.min_sample = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_MIN_COUNT") {
            self.detection.min_count = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_CV_THRESHOLD") {
            self.detection.cv_threshold = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_EXFIL_SIGMA") {
            self.detection.exfil_sigma = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_EXFIL_MIN_RUN") {
            self.detection.exfil_min_run = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_SCAN_MAX_GAP_SECS") {
            self.detection.scan_max_gap_secs = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_SCAN_MIN_TARGETS") {
            self.detection.scan_min_targets = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_C2_MIN_FLOWS") {
            self.detection.c2_min_flows = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_C2_MAX_BYTES_OUT") {
            self.detection.c2_max_bytes_out = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_C2_ENTROPY_MAX") {
            self.detection.c2_entropy_max = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_RARITY_PERCENTILE") {
            self.detection.rarity_percentile = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_BURST_THRESHOLD_SECONDS") {
            self.detection.burst_threshold_seconds = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_NOVELTY_MIN_RUN") {
            self.detection.novelty_min_run = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_BRUTEFORCE_MIN_ATTEMPTS") {
            self.detection.bruteforce_min_attempts = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_BRUTEFORCE_MAX_DURATION_MS") {
            self.detection.bruteforce_max_duration_ms = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_BRUTEFORCE_MAX_BYTES_IN") {
            self.detection.bruteforce_max_bytes_in = v;
        }
        if let Some(v) = env_non_empty("FLOWSENTRY_AUTH_PORTS") {
            let ports = split_ports(&v);
            if !ports.is_empty() {
                self.detection.auth_ports = ports;
            }
        }
        if let Some(v) = env_parse("FLOWSENTRY_STAGING_MIN_SOURCES") {
            self.detection.staging_min_sources = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_STAGING_PERCENTILE") {
            self.detection.staging_percentile = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_DGA_ENTROPY_THRESHOLD") {
            self.detection.dga_entropy_threshold = v;
        }
    }

    fn apply_env_scoring(&mut self) {
        if let Some(v) = env_parse("FLOWSENTRY_ALERT_SCORE_THRESHOLD") {
            self.scoring.alert_score_threshold = v;
        }
    }

    fn apply_env_pipeline(&mut self) {
        if let Some(v) = env_parse("FLOWSENTRY_SHARDS") {
            self.pipeline.shards = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_CHANNEL_CAPACITY") {
            self.pipeline.channel_capacity = v;
        }
        if let Some(v) = env_parse("FLOWSENTRY_FLUSH_INTERVAL_SECS") {
            self.pipeline.flush_interval_secs = v;
        }
    }

    fn apply_env_state(&mut self) {
        if let Some(v) = env_non_empty("FLOWSENTRY_BASELINES_PATH") {
            self.state.baselines_path = PathBuf::from(v);
        }
        if let Some(v) = env_non_empty("FLOWSENTRY_NOVELTY_PATH") {
            self.state.novelty_path = PathBuf::from(v);
        }
    }
}
