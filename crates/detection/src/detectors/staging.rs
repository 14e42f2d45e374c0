//! Data staging and DGA lookups.
//!
//! Staging watches per-destination inbound aggregation (several internal
//! sources pushing an unusually large volume to one internal host) and
//! seals the finding only when the same host later opens an outbound
//! transfer: the inbound window must end strictly before the outbound
//! window begins.
//!
//! DGA flags domains whose lexical entropy, excluding the TLD label, is
//! above the configured threshold.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::stats::{label_entropy, percentile};
use crate::types::{DetectorId, Finding, WindowSpan};
use crate::util::{domain_without_tld, is_internal};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

/// Inbound windows observed before percentile judgments are made.
const MIN_HISTORY_WINDOWS: usize = 10;
/// Bounded history of inbound window sums.
const MAX_HISTORY_WINDOWS: usize = 4_096;
/// Bounded set of staging candidates awaiting an outbound transfer.
const MAX_PENDING_HOSTS: usize = 1_024;

/// One staging candidate awaiting an outbound transfer. `sealed_by`
/// remembers which outbound window produced the finding, so detecting
/// the same window again reproduces it and any other window stays
/// silent.
#[derive(Debug, Clone, Copy)]
struct PendingStage {
    inbound_end: i64,
    staged_bytes: u64,
    sealed_by: Option<WindowSpan>,
}

pub struct StagingDetector {
    min_sources: usize,
    staging_percentile: f64,
    span_secs: i64,
    /// Ascending inbound-sum history for the percentile cut.
    inbound_sums: Vec<f64>,
    pending: HashMap<IpAddr, PendingStage>,
}

impl StagingDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_sources: config.staging_min_sources,
            staging_percentile: config.staging_percentile,
            span_secs: config.window_span_secs,
            inbound_sums: Vec::new(),
            pending: HashMap::new(),
        }
    }

    fn remember_sum(&mut self, sum: f64) {
        let pos = self.inbound_sums.partition_point(|&v| v <= sum);
        self.inbound_sums.insert(pos, sum);
        if self.inbound_sums.len() > MAX_HISTORY_WINDOWS {
            self.inbound_sums.remove(0);
        }
    }

    fn observe_inbound(&mut self, window: &Window) {
        let Some(dst) = window.key().dst else {
            return;
        };
        if !is_internal(&dst) {
            return;
        }

        let sources: HashSet<IpAddr> = window
            .records()
            .iter()
            .filter(|r| is_internal(&r.src_ip))
            .map(|r| r.src_ip)
            .collect();
        let sum: u64 = window.records().iter().map(|r| r.bytes_in).sum();

        self.remember_sum(sum as f64);
        if sources.len() < self.min_sources {
            return;
        }
        if self.inbound_sums.len() < MIN_HISTORY_WINDOWS {
            return;
        }
        if (sum as f64) < percentile(&self.inbound_sums, self.staging_percentile) {
            return;
        }
        if self.pending.len() >= MAX_PENDING_HOSTS && !self.pending.contains_key(&dst) {
            return;
        }
        self.pending.insert(
            dst,
            PendingStage {
                inbound_end: window.span().end_unix,
                staged_bytes: sum,
                sealed_by: None,
            },
        );
    }

    fn seal_outbound(&mut self, window: &Window) -> Vec<Finding> {
        let key = window.key();
        let (Some(src), Some(dst)) = (key.src, key.dst) else {
            return Vec::new();
        };
        let Some(stage) = self.pending.get_mut(&src) else {
            return Vec::new();
        };
        if is_internal(&dst) {
            return Vec::new();
        }
        // Sequential causality: staging must complete before the
        // outbound transfer starts.
        if window.span().start_unix <= stage.inbound_end {
            return Vec::new();
        }
        let bytes_out: u64 = window.records().iter().map(|r| r.bytes_out).sum();
        if bytes_out == 0 {
            return Vec::new();
        }
        // One finding per staging event; the sealing window reproduces
        // it, everything else stays silent.
        if stage.sealed_by.is_some_and(|span| span != window.span()) {
            return Vec::new();
        }
        stage.sealed_by = Some(window.span());

        vec![Finding {
            entity: src.to_string(),
            detector: DetectorId::Staging,
            severity: 0.9,
            evidence: evidence(&[
                ("staged_bytes_in", stage.staged_bytes.to_string()),
                ("inbound_end_unix", stage.inbound_end.to_string()),
                ("outbound_start_unix", window.span().start_unix.to_string()),
                ("outbound_bytes", bytes_out.to_string()),
                ("outbound_dst", dst.to_string()),
            ]),
            span: window.span(),
        }]
    }
}

impl Detector for StagingDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Staging
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![
            GroupingSpec {
                key: KeySpec::Dest,
                policy: FlushPolicy::Tumbling {
                    span_secs: self.span_secs,
                },
            },
            GroupingSpec {
                key: KeySpec::SourceDest,
                policy: FlushPolicy::Tumbling {
                    span_secs: self.span_secs,
                },
            },
        ]
    }

    fn detect(&mut self, window: &Window, _stores: &StoreHandles) -> Vec<Finding> {
        match window.spec().key {
            KeySpec::Dest => {
                self.observe_inbound(window);
                Vec::new()
            }
            KeySpec::SourceDest => self.seal_outbound(window),
            _ => Vec::new(),
        }
    }
}

pub struct DgaDetector {
    entropy_threshold: f64,
    max_gap_secs: i64,
}

impl DgaDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            entropy_threshold: config.dga_entropy_threshold,
            max_gap_secs: config.scan_max_gap_secs,
        }
    }
}

impl Detector for DgaDetector {
    fn id(&self) -> DetectorId {
        DetectorId::DgaDomain
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
        let mut seen: HashSet<&str> = HashSet::new();
        let mut findings = Vec::new();
        for record in window.records() {
            let Some(domain) = record.domain.as_deref() else {
                continue;
            };
            if !seen.insert(domain) {
                continue;
            }
            let entropy = label_entropy(&domain_without_tld(domain));
            if entropy <= self.entropy_threshold {
                continue;
            }
            let severity = (0.5 + 0.1 * (entropy - self.entropy_threshold)).min(0.8);
            findings.push(Finding {
                entity: window.entity(),
                detector: self.id(),
                severity,
                evidence: evidence(&[
                    ("domain", domain.to_string()),
                    ("entropy", format!("{:.3}", entropy)),
                ]),
                span: window.span(),
            });
        }
        findings
    }
}
