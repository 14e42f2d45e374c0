//! Finding aggregation and composite scoring.
//!
//! Findings sharing an entity merge across detectors; the composite is
//! a weighted sum of per-detector severities, so corroborating weak
//! signals can clear the alert threshold that a single one would not.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{Alert, DetectorId, Finding, WindowSpan};

/// Bounded memory for the `(entity, detector, span)` dedup set.
const DEDUP_CAP: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub beaconing: f64,
    pub exfiltration: f64,
    pub scanning: f64,
    pub c2_channel: f64,
    pub protocol_rarity: f64,
    pub novelty_burst: f64,
    pub brute_force: f64,
    pub staging: f64,
    pub dga_domain: f64,
}

impl ScoreWeights {
    pub fn weight(&self, detector: DetectorId) -> f64 {
        match detector {
            DetectorId::Beaconing => self.beaconing,
            DetectorId::Exfiltration => self.exfiltration,
            DetectorId::Scanning => self.scanning,
            DetectorId::C2Channel => self.c2_channel,
            DetectorId::ProtocolRarity => self.protocol_rarity,
            DetectorId::NoveltyBurst => self.novelty_burst,
            DetectorId::BruteForce => self.brute_force,
            DetectorId::Staging => self.staging,
            DetectorId::DgaDomain => self.dga_domain,
        }
    }

    pub fn all(&self) -> [f64; 9] {
        [
            self.beaconing,
            self.exfiltration,
            self.scanning,
            self.c2_channel,
            self.protocol_rarity,
            self.novelty_burst,
            self.brute_force,
            self.staging,
            self.dga_domain,
        ]
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            beaconing: 1.0,
            exfiltration: 1.0,
            scanning: 1.0,
            c2_channel: 1.0,
            protocol_rarity: 1.0,
            novelty_burst: 1.0,
            brute_force: 1.0,
            staging: 1.0,
            dga_domain: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub alert_score_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            alert_score_threshold: 1.0,
        }
    }
}

pub struct FindingAggregator {
    config: ScoringConfig,
    pending: HashMap<String, Vec<Finding>>,
    seen: HashSet<(String, DetectorId, WindowSpan)>,
    seen_order: VecDeque<(String, DetectorId, WindowSpan)>,
}

impl FindingAggregator {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    /// Accept one finding; identical `(entity, detector, span)` tuples
    /// after the first are dropped.
    pub fn ingest(&mut self, finding: Finding) {
        let key = (finding.entity.clone(), finding.detector, finding.span);
        if !self.seen.insert(key.clone()) {
            return;
        }
        self.seen_order.push_back(key);
        if self.seen_order.len() > DEDUP_CAP {
            if let Some(evicted) = self.seen_order.pop_front() {
                self.seen.remove(&evicted);
            }
        }

        self.pending
            .entry(finding.entity.clone())
            .or_default()
            .push(finding);
    }

    pub fn pending_entities(&self) -> usize {
        self.pending.len()
    }

    /// Score and emit all pending entities. Alerts whose composite is
    /// below the threshold are discarded with their findings; the dedup
    /// set survives flushes.
    pub fn flush(&mut self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = Vec::new();
        for (entity, findings) in self.pending.drain() {
            let composite: f64 = findings
                .iter()
                .map(|f| self.config.weights.weight(f.detector) * f.severity)
                .sum();
            if composite < self.config.alert_score_threshold {
                continue;
            }

            let mut contributing: Vec<DetectorId> =
                findings.iter().map(|f| f.detector).collect();
            contributing.sort();
            contributing.dedup();

            alerts.push(Alert {
                entity,
                composite_score: composite,
                contributing,
                findings,
            });
        }

        alerts.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn finding(entity: &str, detector: DetectorId, severity: f64, start: i64) -> Finding {
        Finding {
            entity: entity.to_string(),
            detector,
            severity,
            evidence: BTreeMap::new(),
            span: WindowSpan {
                start_unix: start,
                end_unix: start + 60,
            },
        }
    }

    #[test]
    fn duplicate_findings_are_dropped() {
        let mut agg = FindingAggregator::new(ScoringConfig::default());
        agg.ingest(finding("10.0.0.5", DetectorId::Scanning, 0.8, 0));
        agg.ingest(finding("10.0.0.5", DetectorId::Scanning, 0.8, 0));
        agg.ingest(finding("10.0.0.5", DetectorId::BruteForce, 0.6, 0));

        let alerts = agg.flush();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].findings.len(), 2);
        assert!((alerts[0].composite_score - 1.4).abs() < 1e-9);
    }

    #[test]
    fn corroboration_clears_threshold_single_weak_signal_does_not() {
        let mut agg = FindingAggregator::new(ScoringConfig::default());
        agg.ingest(finding("10.0.0.5", DetectorId::ProtocolRarity, 0.4, 0));
        agg.ingest(finding("10.0.0.9", DetectorId::ProtocolRarity, 0.4, 0));
        agg.ingest(finding("10.0.0.9", DetectorId::NoveltyBurst, 0.7, 0));

        let alerts = agg.flush();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].entity, "10.0.0.9");
        assert_eq!(
            alerts[0].contributing,
            vec![DetectorId::ProtocolRarity, DetectorId::NoveltyBurst]
        );
    }

    #[test]
    fn weights_scale_the_composite() {
        let config = ScoringConfig {
            weights: ScoreWeights {
                protocol_rarity: 3.0,
                ..ScoreWeights::default()
            },
            alert_score_threshold: 1.0,
        };
        let mut agg = FindingAggregator::new(config);
        agg.ingest(finding("10.0.0.5", DetectorId::ProtocolRarity, 0.4, 0));

        let alerts = agg.flush();
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].composite_score - 1.2).abs() < 1e-9);
    }

    #[test]
    fn alerts_sort_by_score_then_entity() {
        let mut agg = FindingAggregator::new(ScoringConfig::default());
        agg.ingest(finding("10.0.0.2", DetectorId::Scanning, 1.0, 0));
        agg.ingest(finding("10.0.0.1", DetectorId::Scanning, 1.0, 0));
        agg.ingest(finding("10.0.0.3", DetectorId::Staging, 0.9, 0));
        agg.ingest(finding("10.0.0.3", DetectorId::Scanning, 0.9, 0));

        let alerts = agg.flush();
        let entities: Vec<&str> = alerts.iter().map(|a| a.entity.as_str()).collect();
        assert_eq!(entities, vec!["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn dedup_survives_flush() {
        let mut agg = FindingAggregator::new(ScoringConfig::default());
        agg.ingest(finding("10.0.0.5", DetectorId::Scanning, 1.0, 0));
        assert_eq!(agg.flush().len(), 1);

        agg.ingest(finding("10.0.0.5", DetectorId::Scanning, 1.0, 0));
        assert!(agg.flush().is_empty());
    }
}
