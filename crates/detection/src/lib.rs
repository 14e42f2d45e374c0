//! Flow analytics core: windowed grouping over a normalized flow
//! stream, online baselining, eight anomaly detectors, and a finding
//! aggregator with composite scoring.

pub mod aggregate;
mod config;
pub mod detectors;
mod engine;
pub mod stats;
mod types;
pub mod util;
mod window;

pub use aggregate::{FindingAggregator, ScoreWeights, ScoringConfig};
pub use config::DetectionConfig;
pub use detectors::{default_detectors, Detector, StoreHandles, CAT_BYTES_OUT_HOURLY, CAT_PROTO_PORT};
pub use engine::{
    apply_record_baselines, is_novelty_recording_spec, record_window_identifiers,
    DetectionEngine, EngineCounters,
};
pub use types::{Alert, DetectorId, Finding, FlowRecord, Protocol, WindowSpan};
pub use window::{
    FlushPolicy, GroupKey, GroupingEngine, GroupingSpec, KeySpec, OutOfOrderRecord, Window,
};

#[cfg(test)]
mod test_support;
