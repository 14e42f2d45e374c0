//! C2 beaconing: periodic outbound connections to one (dst, port).
//!
//! Over a tumbling per-(src, dst, port) window, a low coefficient of
//! variation of the inter-arrival times means machine-regular timing.
//! A zero mean interval (all flows in the same second) is treated as
//! maximally irregular, not as a beacon.

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::stats::{coefficient_of_variation, inter_arrivals, mean};
use crate::types::{DetectorId, Finding};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

pub struct BeaconingDetector {
    min_count: usize,
    cv_threshold: f64,
    span_secs: i64,
}

impl BeaconingDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_count: config.min_count,
            cv_threshold: config.cv_threshold,
            span_secs: config.window_span_secs,
        }
    }
}

impl Detector for BeaconingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Beaconing
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::SourceDestPort,
            policy: FlushPolicy::Tumbling {
                span_secs: self.span_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, _stores: &StoreHandles) -> Vec<Finding> {
        if window.len() < self.min_count {
            return Vec::new();
        }

        let times: Vec<i64> = window.records().iter().map(|r| r.start_unix).collect();
        let gaps = inter_arrivals(&times);
        let cv = coefficient_of_variation(&gaps);
        if !cv.is_finite() || cv >= self.cv_threshold {
            return Vec::new();
        }

        let key = window.key();
        let severity = 0.6 + 0.4 * (1.0 - cv / self.cv_threshold);
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity: severity.clamp(0.0, 1.0),
            evidence: evidence(&[
                ("flows", window.len().to_string()),
                ("cv", format!("{:.4}", cv)),
                ("mean_interval_secs", format!("{:.1}", mean(&gaps))),
                (
                    "dst",
                    key.dst.map(|ip| ip.to_string()).unwrap_or_default(),
                ),
                (
                    "dst_port",
                    key.dst_port.map(|p| p.to_string()).unwrap_or_default(),
                ),
            ]),
            span: window.span(),
        }]
    }
}
