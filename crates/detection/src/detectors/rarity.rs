//! Protocol rarity: (protocol, dst port) combinations below the
//! configured percentile of the global frequency table.
//!
//! The table lives in the baseline store (`proto_port` category) and is
//! fed per record by the pipeline; the detector only reads it. Rare
//! combos are correlated per source via a bounded fan-out map.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles, CAT_PROTO_PORT};
use crate::types::{DetectorId, Finding};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

/// Minimum table observations, as a multiple of `min_sample`, before
/// percentile judgments mean anything.
const TABLE_WARMUP_FACTOR: u64 = 100;
/// Maximum tracked sources in the fan-out map (LRU evict beyond this).
const MAX_TRACKED_SOURCES: usize = 4_096;

struct SourceFanOut {
    combos: HashSet<String>,
    last_tick: u64,
}

pub struct RarityDetector {
    percentile: f64,
    min_sample: u64,
    span_secs: i64,
    fan_out: HashMap<IpAddr, SourceFanOut>,
    tick: u64,
}

impl RarityDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            percentile: config.rarity_percentile,
            min_sample: config.min_sample,
            span_secs: config.window_span_secs,
            fan_out: HashMap::new(),
            tick: 0,
        }
    }

    fn note_rare_combo(&mut self, src: IpAddr, combo: &str) -> usize {
        self.tick += 1;
        if !self.fan_out.contains_key(&src) && self.fan_out.len() >= MAX_TRACKED_SOURCES {
            if let Some(oldest) = self
                .fan_out
                .iter()
                .min_by_key(|(_, v)| v.last_tick)
                .map(|(k, _)| *k)
            {
                self.fan_out.remove(&oldest);
            }
        }
        let entry = self.fan_out.entry(src).or_insert_with(|| SourceFanOut {
            combos: HashSet::new(),
            last_tick: 0,
        });
        entry.last_tick = self.tick;
        entry.combos.insert(combo.to_string());
        entry.combos.len()
    }
}

impl Detector for RarityDetector {
    fn id(&self) -> DetectorId {
        DetectorId::ProtocolRarity
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::SourceDest,
            policy: FlushPolicy::Tumbling {
                span_secs: self.span_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, stores: &StoreHandles) -> Vec<Finding> {
        let total = stores.baselines.category_total(CAT_PROTO_PORT);
        if total < self.min_sample * TABLE_WARMUP_FACTOR {
            return Vec::new();
        }

        let mut rare: Vec<(String, u64)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for record in window.records() {
            let combo = record.proto_port_key();
            if !seen.insert(combo.clone()) {
                continue;
            }
            let count = stores
                .baselines
                .get(CAT_PROTO_PORT, &combo)
                .map(|s| s.count)
                .unwrap_or(0);
            if (count as f64) < self.percentile * total as f64 {
                rare.push((combo, count));
            }
        }

        if rare.is_empty() {
            return Vec::new();
        }

        let src = window.key().src;
        let fan_out = match src {
            Some(src) => {
                let mut widest = 0;
                for (combo, _) in &rare {
                    widest = self.note_rare_combo(src, combo);
                }
                widest
            }
            None => rare.len(),
        };

        let combos: Vec<String> = rare.iter().map(|(c, _)| c.clone()).collect();
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity: 0.4,
            evidence: evidence(&[
                ("rare_combos", combos.join(",")),
                ("table_total", total.to_string()),
                ("src_rare_fanout", fan_out.to_string()),
            ]),
            span: window.span(),
        }]
    }
}
