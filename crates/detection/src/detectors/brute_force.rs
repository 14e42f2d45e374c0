//! Brute-force authentication: many short, low-payload connections to
//! one auth-service port. Machine-regular timing (cv < 0.1) upgrades
//! the severity.

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::stats::{coefficient_of_variation, inter_arrivals, mean};
use crate::types::{DetectorId, Finding};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

const STRONG_TIMING_CV: f64 = 0.1;

pub struct BruteForceDetector {
    min_attempts: usize,
    max_duration_ms: f64,
    max_bytes_in: f64,
    auth_ports: Vec<u16>,
    max_gap_secs: i64,
}

impl BruteForceDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_attempts: config.bruteforce_min_attempts,
            max_duration_ms: config.bruteforce_max_duration_ms,
            max_bytes_in: config.bruteforce_max_bytes_in,
            auth_ports: config.auth_ports.clone(),
            max_gap_secs: config.scan_max_gap_secs,
        }
    }
}

impl Detector for BruteForceDetector {
    fn id(&self) -> DetectorId {
        DetectorId::BruteForce
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::SourceDestPort,
            policy: FlushPolicy::Gap {
                max_gap_secs: self.max_gap_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, _stores: &StoreHandles) -> Vec<Finding> {
        let Some(port) = window.key().dst_port else {
            return Vec::new();
        };
        if !self.auth_ports.contains(&port) {
            return Vec::new();
        }
        if window.len() < self.min_attempts {
            return Vec::new();
        }

        let records = window.records();
        let mean_duration = mean(&records.iter().map(|r| r.duration_ms as f64).collect::<Vec<_>>());
        let mean_in = mean(&records.iter().map(|r| r.bytes_in as f64).collect::<Vec<_>>());
        if mean_duration >= self.max_duration_ms || mean_in >= self.max_bytes_in {
            return Vec::new();
        }

        let times: Vec<i64> = records.iter().map(|r| r.start_unix).collect();
        let cv = coefficient_of_variation(&inter_arrivals(&times));
        let scripted = cv.is_finite() && cv < STRONG_TIMING_CV;
        let severity = if scripted { 0.9 } else { 0.6 };

        let key = window.key();
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity,
            evidence: evidence(&[
                ("attempts", window.len().to_string()),
                ("mean_duration_ms", format!("{:.1}", mean_duration)),
                ("mean_bytes_in", format!("{:.1}", mean_in)),
                ("timing_cv", format!("{:.4}", cv)),
                (
                    "dst",
                    key.dst.map(|ip| ip.to_string()).unwrap_or_default(),
                ),
                ("dst_port", port.to_string()),
            ]),
            span: window.span(),
        }]
    }
}
