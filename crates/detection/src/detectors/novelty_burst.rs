//! Novel-destination bursts: a source contacting a run of
//! never-before-seen destinations in rapid succession.
//!
//! Reads the novelty store only; destination recording happens in the
//! pipeline after the window has been analyzed. Abstains while the
//! store is inside its bootstrap horizon, so a cold start's first day
//! becomes baseline instead of a wall of alerts.

use baseline::NoveltyCategory;

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::types::{DetectorId, Finding};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

pub struct NoveltyBurstDetector {
    burst_threshold_secs: i64,
    min_run: usize,
    max_gap_secs: i64,
}

impl NoveltyBurstDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            burst_threshold_secs: config.burst_threshold_seconds,
            min_run: config.novelty_min_run,
            max_gap_secs: config.scan_max_gap_secs,
        }
    }
}

impl Detector for NoveltyBurstDetector {
    fn id(&self) -> DetectorId {
        DetectorId::NoveltyBurst
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::Source,
            policy: FlushPolicy::Gap {
                max_gap_secs: self.max_gap_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, stores: &StoreHandles) -> Vec<Finding> {
        if stores.novelty.in_bootstrap(window.span().end_unix) {
            return Vec::new();
        }

        let mut run = 0usize;
        let mut best_run = 0usize;
        let mut last_novel_ts: Option<i64> = None;
        let mut sample_dst = String::new();

        for record in window.records() {
            let novel = !stores
                .novelty
                .seen(NoveltyCategory::DstIp, &record.dst_ip.to_string());
            if !novel {
                run = 0;
                last_novel_ts = None;
                continue;
            }

            run = match last_novel_ts {
                Some(prev) if record.start_unix - prev < self.burst_threshold_secs => run + 1,
                _ => 1,
            };
            last_novel_ts = Some(record.start_unix);
            if run > best_run {
                best_run = run;
                sample_dst = record.dst_ip.to_string();
            }
        }

        if best_run < self.min_run {
            return Vec::new();
        }

        let severity = (0.5 + 0.05 * best_run as f64).min(0.8);
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity,
            evidence: evidence(&[
                ("novel_run", best_run.to_string()),
                ("last_novel_dst", sample_dst),
                (
                    "burst_threshold_secs",
                    self.burst_threshold_secs.to_string(),
                ),
            ]),
            span: window.span(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flow, window};

    const DAY: i64 = 86_400;

    fn active_stores() -> StoreHandles {
        // Horizon opened at t=0, so anything past DAY is post-bootstrap.
        let stores = StoreHandles::in_memory();
        stores.novelty.observe_clock(0);
        stores
    }

    #[test]
    fn rapid_novel_run_is_flagged() {
        let mut det = NoveltyBurstDetector::new(&DetectionConfig::default());
        let stores = active_stores();
        let records: Vec<_> = (0..4)
            .map(|i| flow("10.0.0.5", &format!("203.0.113.{}", i + 1), 443, DAY + i * 2))
            .collect();
        let w = window(det.subscriptions()[0], records);

        let findings = det.detect(&w, &stores);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].evidence["novel_run"], "4");
    }

    #[test]
    fn slow_novel_contacts_are_not_a_burst() {
        let mut det = NoveltyBurstDetector::new(&DetectionConfig::default());
        let stores = active_stores();
        // Novel destinations but 60s apart: each restarts the run.
        let records: Vec<_> = (0..5)
            .map(|i| flow("10.0.0.5", &format!("203.0.113.{}", i + 1), 443, DAY + i * 60))
            .collect();
        let w = window(det.subscriptions()[0], records);
        assert!(det.detect(&w, &stores).is_empty());
    }

    #[test]
    fn known_destinations_break_the_run() {
        let mut det = NoveltyBurstDetector::new(&DetectionConfig::default());
        let stores = active_stores();
        stores.novelty.record(NoveltyCategory::DstIp, "203.0.113.2");

        let records: Vec<_> = (0..4)
            .map(|i| flow("10.0.0.5", &format!("203.0.113.{}", i + 1), 443, DAY + i * 2))
            .collect();
        let w = window(det.subscriptions()[0], records);
        // Runs of 1 and 2 around the known destination; below min_run.
        assert!(det.detect(&w, &stores).is_empty());
    }

    #[test]
    fn bootstrap_horizon_suppresses_everything() {
        let mut det = NoveltyBurstDetector::new(&DetectionConfig::default());
        let stores = active_stores();
        let records: Vec<_> = (0..10)
            .map(|i| flow("10.0.0.5", &format!("203.0.113.{}", i + 1), 443, 100 + i * 2))
            .collect();
        let w = window(det.subscriptions()[0], records);
        assert!(det.detect(&w, &stores).is_empty());
    }
}
