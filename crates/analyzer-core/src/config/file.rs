use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::AnalyzerConfig;
use super::util::non_empty;

const CONFIG_CANDIDATES: [&str; 2] = ["flowsentry.toml", "/etc/flowsentry/flowsentry.toml"];

impl AnalyzerConfig {
    pub(super) fn apply_file_config(&mut self) -> Result<bool> {
        let Some(path) = resolve_config_path()? else {
            return Ok(false);
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading config file {}", path.display()))?;
        self.apply_file_str(&raw)
            .with_context(|| format!("failed parsing TOML config {}", path.display()))?;
        Ok(true)
    }

    pub(super) fn apply_file_str(&mut self, raw: &str) -> Result<()> {
        let file_cfg: FileConfig = toml::from_str(raw)?;
        self.apply_file_ingest(file_cfg.ingest);
        self.apply_file_detection(file_cfg.detection);
        self.apply_file_scoring(file_cfg.scoring);
        self.apply_file_pipeline(file_cfg.pipeline);
        self.apply_file_state(file_cfg.state);
        Ok(())
    }

    fn apply_file_ingest(&mut self, ingest: Option<FileIngestConfig>) {
        let Some(ingest) = ingest else {
            return;
        };
        if let Some(v) = non_empty(ingest.path) {
            self.input_path = Some(PathBuf::from(v));
        }
    }

    fn apply_file_detection(&mut self, detection: Option<FileDetectionConfig>) {
        let Some(detection) = detection else {
            return;
        };

        if let Some(v) = detection.window_span_secs {
            self.detection.window_span_secs = v;
        }
        if let Some(v) = detection.reorder_tolerance_secs {
            self.detection.reorder_tolerance_secs = v;
        }
        if let Some(v) = detection.min_sample {
            self.detection.min_sample = v;
        }
        if let Some(v) = detection.min_count {
            self.detection.min_count = v;
        }
        if let Some(v) = detection.cv_threshold {
            self.detection.cv_threshold = v;
        }
        if let Some(v) = detection.exfil_sigma {
            self.detection.exfil_sigma = v;
        }
        if let Some(v) = detection.exfil_min_run {
            self.detection.exfil_min_run = v;
        }
        if let Some(v) = detection.scan_max_gap_secs {
            self.detection.scan_max_gap_secs = v;
        }
        if let Some(v) = detection.scan_min_targets {
            self.detection.scan_min_targets = v;
        }
        if let Some(v) = detection.c2_min_flows {
            self.detection.c2_min_flows = v;
        }
        if let Some(v) = detection.c2_max_bytes_out {
            self.detection.c2_max_bytes_out = v;
        }
        if let Some(v) = detection.c2_entropy_max {
            self.detection.c2_entropy_max = v;
        }
        if let Some(v) = detection.rarity_percentile {
            self.detection.rarity_percentile = v;
        }
        if let Some(v) = detection.burst_threshold_seconds {
            self.detection.burst_threshold_seconds = v;
        }
        if let Some(v) = detection.novelty_min_run {
            self.detection.novelty_min_run = v;
        }
        if let Some(v) = detection.bruteforce_min_attempts {
            self.detection.bruteforce_min_attempts = v;
        }
        if let Some(v) = detection.bruteforce_max_duration_ms {
            self.detection.bruteforce_max_duration_ms = v;
        }
        if let Some(v) = detection.bruteforce_max_bytes_in {
            self.detection.bruteforce_max_bytes_in = v;
        }
        if let Some(v) = detection.auth_ports {
            self.detection.auth_ports = v;
        }
        if let Some(v) = detection.staging_min_sources {
            self.detection.staging_min_sources = v;
        }
        if let Some(v) = detection.staging_percentile {
            self.detection.staging_percentile = v;
        }
        if let Some(v) = detection.dga_entropy_threshold {
            self.detection.dga_entropy_threshold = v;
        }
    }

    fn apply_file_scoring(&mut self, scoring: Option<FileScoringConfig>) {
        let Some(scoring) = scoring else {
            return;
        };

        if let Some(v) = scoring.alert_score_threshold {
            self.scoring.alert_score_threshold = v;
        }
        let Some(weights) = scoring.weights else {
            return;
        };
        if let Some(v) = weights.beaconing {
            self.scoring.weights.beaconing = v;
        }
        if let Some(v) = weights.exfiltration {
            self.scoring.weights.exfiltration = v;
        }
        if let Some(v) = weights.scanning {
            self.scoring.weights.scanning = v;
        }
        if let Some(v) = weights.c2_channel {
            self.scoring.weights.c2_channel = v;
        }
        if let Some(v) = weights.protocol_rarity {
            self.scoring.weights.protocol_rarity = v;
        }
        if let Some(v) = weights.novelty_burst {
            self.scoring.weights.novelty_burst = v;
        }
        if let Some(v) = weights.brute_force {
            self.scoring.weights.brute_force = v;
        }
        if let Some(v) = weights.staging {
            self.scoring.weights.staging = v;
        }
        if let Some(v) = weights.dga_domain {
            self.scoring.weights.dga_domain = v;
        }
    }

    fn apply_file_pipeline(&mut self, pipeline: Option<FilePipelineConfig>) {
        let Some(pipeline) = pipeline else {
            return;
        };
        if let Some(v) = pipeline.shards {
            self.pipeline.shards = v;
        }
        if let Some(v) = pipeline.channel_capacity {
            self.pipeline.channel_capacity = v;
        }
        if let Some(v) = pipeline.flush_interval_secs {
            self.pipeline.flush_interval_secs = v;
        }
    }

    fn apply_file_state(&mut self, state: Option<FileStateConfig>) {
        let Some(state) = state else {
            return;
        };
        if let Some(v) = non_empty(state.baselines_path) {
            self.state.baselines_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(state.novelty_path) {
            self.state.novelty_path = PathBuf::from(v);
        }
    }
}

fn resolve_config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var("FLOWSENTRY_CONFIG") {
        let p = p.trim();
        if !p.is_empty() {
            let path = PathBuf::from(p);
            if !path.exists() {
                anyhow::bail!(
                    "configured FLOWSENTRY_CONFIG does not exist: {}",
                    path.display()
                );
            }
            return Ok(Some(path));
        }
    }

    for candidate in CONFIG_CANDIDATES {
        let p = Path::new(candidate);
        if p.exists() {
            return Ok(Some(p.to_path_buf()));
        }
    }

    Ok(None)
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    ingest: Option<FileIngestConfig>,
    #[serde(default)]
    detection: Option<FileDetectionConfig>,
    #[serde(default)]
    scoring: Option<FileScoringConfig>,
    #[serde(default)]
    pipeline: Option<FilePipelineConfig>,
    #[serde(default)]
    state: Option<FileStateConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileIngestConfig {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileDetectionConfig {
    #[serde(default)]
    window_span_secs: Option<i64>,
    #[serde(default)]
    reorder_tolerance_secs: Option<i64>,
    #[serde(default)]
    min_sample: Option<u64>,
    #[serde(default)]
    min_count: Option<usize>,
    #[serde(default)]
    cv_threshold: Option<f64>,
    #[serde(default)]
    exfil_sigma: Option<f64>,
    #[serde(default)]
    exfil_min_run: Option<usize>,
    #[serde(default)]
    scan_max_gap_secs: Option<i64>,
    #[serde(default)]
    scan_min_targets: Option<usize>,
    #[serde(default)]
    c2_min_flows: Option<usize>,
    #[serde(default)]
    c2_max_bytes_out: Option<f64>,
    #[serde(default)]
    c2_entropy_max: Option<f64>,
    #[serde(default)]
    rarity_percentile: Option<f64>,
    #[serde(default)]
    burst_threshold_seconds: Option<i64>,
    #[serde(default)]
    novelty_min_run: Option<usize>,
    #[serde(default)]
    bruteforce_min_attempts: Option<usize>,
    #[serde(default)]
    bruteforce_max_duration_ms: Option<f64>,
    #[serde(default)]
    bruteforce_max_bytes_in: Option<f64>,
    #[serde(default)]
    auth_ports: Option<Vec<u16>>,
    #[serde(default)]
    staging_min_sources: Option<usize>,
    #[serde(default)]
    staging_percentile: Option<f64>,
    #[serde(default)]
    dga_entropy_threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileScoringConfig {
    #[serde(default)]
    alert_score_threshold: Option<f64>,
    #[serde(default)]
    weights: Option<FileScoreWeights>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileScoreWeights {
    #[serde(default)]
    beaconing: Option<f64>,
    #[serde(default)]
    exfiltration: Option<f64>,
    #[serde(default)]
    scanning: Option<f64>,
    #[serde(default)]
    c2_channel: Option<f64>,
    #[serde(default)]
    protocol_rarity: Option<f64>,
    #[serde(default)]
    novelty_burst: Option<f64>,
    #[serde(default)]
    brute_force: Option<f64>,
    #[serde(default)]
    staging: Option<f64>,
    #[serde(default)]
    dga_domain: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FilePipelineConfig {
    #[serde(default)]
    shards: Option<usize>,
    #[serde(default)]
    channel_capacity: Option<usize>,
    #[serde(default)]
    flush_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileStateConfig {
    #[serde(default)]
    baselines_path: Option<String>,
    #[serde(default)]
    novelty_path: Option<String>,
}
