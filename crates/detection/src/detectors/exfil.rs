//! Volumetric exfiltration: outbound volume far above the source's
//! hourly baseline, sustained across several flows to the same pair.
//!
//! A single spike is not enough; at least `exfil_min_run` records in
//! the window must exceed `mean + sigma * stddev` of the per-(source,
//! hour-of-day) bucket. Buckets below `min_sample` abstain.

use baseline::BucketStats;

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles, CAT_BYTES_OUT_HOURLY};
use crate::types::{DetectorId, Finding, FlowRecord};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

pub struct ExfilDetector {
    sigma: f64,
    min_run: usize,
    min_sample: u64,
    span_secs: i64,
}

impl ExfilDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            sigma: config.exfil_sigma,
            min_run: config.exfil_min_run,
            min_sample: config.min_sample,
            span_secs: config.window_span_secs,
        }
    }
}

pub(crate) fn hourly_key(record: &FlowRecord) -> String {
    format!("{}|{:02}", record.src_ip, record.hour_of_day())
}

pub(crate) fn exceeds_baseline(stats: &BucketStats, value: f64, sigma: f64) -> bool {
    value > stats.mean + sigma * stats.stddev()
}

impl Detector for ExfilDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Exfiltration
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
        let mut flagged = 0usize;
        let mut peak = 0u64;
        let mut reference: Option<BucketStats> = None;

        for record in window.records() {
            let Some(stats) = stores.baselines.get(CAT_BYTES_OUT_HOURLY, &hourly_key(record))
            else {
                continue;
            };
            if stats.count < self.min_sample {
                continue;
            }
            if exceeds_baseline(&stats, record.bytes_out as f64, self.sigma) {
                flagged += 1;
                peak = peak.max(record.bytes_out);
                reference = Some(stats);
            }
        }

        if flagged < self.min_run {
            return Vec::new();
        }

        let stats = reference.unwrap_or_default();
        let key = window.key();
        let severity = (0.6 + 0.05 * (flagged - self.min_run) as f64).min(0.9);
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity,
            evidence: evidence(&[
                ("flagged_flows", flagged.to_string()),
                ("peak_bytes_out", peak.to_string()),
                ("baseline_mean", format!("{:.1}", stats.mean)),
                ("baseline_stddev", format!("{:.1}", stats.stddev())),
                (
                    "dst",
                    key.dst.map(|ip| ip.to_string()).unwrap_or_default(),
                ),
            ]),
            span: window.span(),
        }]
    }
}
