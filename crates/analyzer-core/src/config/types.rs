use std::path::PathBuf;

use anyhow::{ensure, Result};
use detection::{DetectionConfig, ScoringConfig};

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// NDJSON input file; stdin when unset.
    pub input_path: Option<PathBuf>,
    pub detection: DetectionConfig,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub shards: usize,
    pub channel_capacity: usize,
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub baselines_path: PathBuf,
    pub novelty_path: PathBuf,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            detection: DetectionConfig::default(),
            scoring: ScoringConfig::default(),
            pipeline: PipelineConfig {
                shards: 4,
                channel_capacity: 1024,
                flush_interval_secs: 60,
            },
            state: StateConfig {
                baselines_path: PathBuf::from("state/baselines.bin"),
                novelty_path: PathBuf::from("state/novelty.bin"),
            },
        }
    }
}

impl AnalyzerConfig {
    /// Rejects values the detectors cannot run with. Runs once at
    /// startup after all layers have been applied.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        ensure!(d.window_span_secs > 0, "window_span_secs must be positive");
        ensure!(
            d.reorder_tolerance_secs >= 0,
            "reorder_tolerance_secs must not be negative"
        );
        ensure!(d.scan_max_gap_secs > 0, "scan_max_gap_secs must be positive");
        ensure!(
            d.burst_threshold_seconds > 0,
            "burst_threshold_seconds must be positive"
        );
        ensure!(
            d.cv_threshold.is_finite() && d.cv_threshold > 0.0,
            "cv_threshold must be finite and positive"
        );
        ensure!(
            d.exfil_sigma.is_finite() && d.exfil_sigma > 0.0,
            "exfil_sigma must be finite and positive"
        );
        ensure!(
            d.c2_max_bytes_out.is_finite() && d.c2_max_bytes_out > 0.0,
            "c2_max_bytes_out must be finite and positive"
        );
        ensure!(
            d.c2_entropy_max.is_finite() && d.c2_entropy_max > 0.0,
            "c2_entropy_max must be finite and positive"
        );
        ensure!(
            d.rarity_percentile > 0.0 && d.rarity_percentile < 1.0,
            "rarity_percentile must lie in (0, 1)"
        );
        ensure!(
            d.staging_percentile > 0.0 && d.staging_percentile < 1.0,
            "staging_percentile must lie in (0, 1)"
        );
        ensure!(
            d.bruteforce_max_duration_ms.is_finite() && d.bruteforce_max_duration_ms > 0.0,
            "bruteforce_max_duration_ms must be finite and positive"
        );
        ensure!(
            d.bruteforce_max_bytes_in.is_finite() && d.bruteforce_max_bytes_in > 0.0,
            "bruteforce_max_bytes_in must be finite and positive"
        );
        ensure!(
            d.dga_entropy_threshold.is_finite() && d.dga_entropy_threshold > 0.0,
            "dga_entropy_threshold must be finite and positive"
        );
        ensure!(!d.auth_ports.is_empty(), "auth_ports must not be empty");

        ensure!(
            self.scoring.alert_score_threshold.is_finite()
                && self.scoring.alert_score_threshold > 0.0,
            "alert_score_threshold must be finite and positive"
        );
        for weight in self.scoring.weights.all() {
            ensure!(
                weight.is_finite() && weight >= 0.0,
                "detector weights must be finite and not negative"
            );
        }

        ensure!(self.pipeline.shards > 0, "pipeline shards must be positive");
        ensure!(
            self.pipeline.channel_capacity > 0,
            "pipeline channel_capacity must be positive"
        );
        ensure!(
            self.pipeline.flush_interval_secs > 0,
            "pipeline flush_interval_secs must be positive"
        );

        Ok(())
    }
}
