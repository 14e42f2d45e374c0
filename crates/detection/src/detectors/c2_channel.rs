//! C2 over HTTP(S): many small, same-sized requests on ports 80/443
//! with a lopsided in/out byte ratio.
//!
//! Low Shannon entropy of the outbound sizes means the client sends
//! near-identical payloads (polling). A zero outbound mean resolves to
//! non-match rather than dividing by zero.

use crate::config::DetectionConfig;
use crate::detectors::{evidence, Detector, StoreHandles};
use crate::stats::{mean, value_entropy};
use crate::types::{DetectorId, Finding};
use crate::window::{FlushPolicy, GroupingSpec, KeySpec, Window};

const HTTP_PORTS: [u16; 2] = [80, 443];

pub struct C2ChannelDetector {
    min_flows: usize,
    max_bytes_out: f64,
    entropy_max: f64,
    span_secs: i64,
}

impl C2ChannelDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_flows: config.c2_min_flows,
            max_bytes_out: config.c2_max_bytes_out,
            entropy_max: config.c2_entropy_max,
            span_secs: config.window_span_secs,
        }
    }
}

impl Detector for C2ChannelDetector {
    fn id(&self) -> DetectorId {
        DetectorId::C2Channel
    }

    fn subscriptions(&self) -> Vec<GroupingSpec> {
        vec![GroupingSpec {
            key: KeySpec::SourceDest,
            policy: FlushPolicy::Tumbling {
                span_secs: self.span_secs,
            },
        }]
    }

    fn detect(&mut self, window: &Window, _stores: &StoreHandles) -> Vec<Finding> {
        let http: Vec<_> = window
            .records()
            .iter()
            .filter(|r| HTTP_PORTS.contains(&r.dst_port))
            .collect();
        if http.len() < self.min_flows {
            return Vec::new();
        }

        let out_sizes: Vec<u64> = http.iter().map(|r| r.bytes_out).collect();
        let mean_out = mean(&out_sizes.iter().map(|&v| v as f64).collect::<Vec<_>>());
        if mean_out <= 0.0 || mean_out >= self.max_bytes_out {
            return Vec::new();
        }

        let entropy = value_entropy(&out_sizes);
        if entropy >= self.entropy_max {
            return Vec::new();
        }

        let mean_in = mean(&http.iter().map(|r| r.bytes_in as f64).collect::<Vec<_>>());
        let ratio = mean_in / mean_out;
        if (0.2..=5.0).contains(&ratio) {
            return Vec::new();
        }

        let key = window.key();
        vec![Finding {
            entity: window.entity(),
            detector: self.id(),
            severity: 0.8,
            evidence: evidence(&[
                ("flows", http.len().to_string()),
                ("mean_bytes_out", format!("{:.1}", mean_out)),
                ("mean_bytes_in", format!("{:.1}", mean_in)),
                ("size_entropy", format!("{:.3}", entropy)),
                ("in_out_ratio", format!("{:.3}", ratio)),
                (
                    "dst",
                    key.dst.map(|ip| ip.to_string()).unwrap_or_default(),
                ),
            ]),
            span: window.span(),
        }]
    }
}
