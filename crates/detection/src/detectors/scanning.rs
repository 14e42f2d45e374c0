//! Internal scanning / lateral movement: one source touching many
//! distinct internal destinations inside a greedy gap window.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::types::{DetectorId, Finding};
use crate::util::is_internal;
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

pub struct ScanningDetector {
    min_targets: usize,
    max_gap_secs: i64,
}

impl ScanningDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_targets: config.scan_min_targets,
            max_gap_secs: config.scan_max_gap_secs,
        }
    }
}

impl Detector for ScanningDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Scanning
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::Source,
            policy: FlushPolicy::Gap {
                max_gap_secs: self.max_gap_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, _stores: &StoreHandles) -> Vec<Finding> {
        let mut targets: HashSet<IpAddr> = HashSet::new();
        let mut ports: HashSet<u16> = HashSet::new();
        for record in window.records() {
            if is_internal(&record.dst_ip) {
                targets.insert(record.dst_ip);
                ports.insert(record.dst_port);
            }
        }

        if targets.len() < self.min_targets {
            return Vec::new();
        }

        let severity = (0.7 + 0.01 * (targets.len() - self.min_targets) as f64).min(1.0);
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity,
            evidence: evidence(&[
                ("targets", targets.len().to_string()),
                ("distinct_ports", ports.len().to_string()),
                ("flows", window.len().to_string()),
            ]),
            span: window.span(),
        }]
    }
}
