//! The detector modules. Each one is an independent, read-only analyzer
//! over flushed windows, consulting the shared baseline/novelty stores
//! and emitting scored findings.

use std::collections::BTreeMap;
use std::sync::Arc;

use baseline::{BaselineStore, NoveltyStore};

use crate::types::{DetectorId, Finding};
use crate::window::{GroupingSpec, Window};

mod beaconing;
mod brute_force;
mod c2_channel;
mod exfil;
mod novelty_burst;
mod rarity;
mod scanning;
mod staging;

pub(crate) use exfil::hourly_key;

pub use beaconing::BeaconingDetector;
pub use brute_force::BruteForceDetector;
pub use c2_channel::C2ChannelDetector;
pub use exfil::ExfilDetector;
pub use novelty_burst::NoveltyBurstDetector;
pub use rarity::RarityDetector;
pub use scanning::ScanningDetector;
pub use staging::{DgaDetector, StagingDetector};

use crate::config::DetectionConfig;

/// Baseline category for per-(source, hour-of-day) outbound volume.
pub const CAT_BYTES_OUT_HOURLY: &str = "bytes_out_hourly";
/// Baseline category for the global (protocol, dst port) frequency table.
pub const CAT_PROTO_PORT: &str = "proto_port";

/// Read handles on the cross-detector shared stores.
#[derive(Clone)]
pub struct StoreHandles {
    pub baselines: Arc<BaselineStore>,
    pub novelty: Arc<NoveltyStore>,
}

impl StoreHandles {
    pub fn new(baselines: Arc<BaselineStore>, novelty: Arc<NoveltyStore>) -> Self {
        Self { baselines, novelty }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(BaselineStore::new()), Arc::new(NoveltyStore::new()))
    }
}

/// One anomaly analyzer. Detectors never write the shared stores;
/// identifier recording happens in the pipeline after a window has been
/// analyzed. Running a detector twice over the same window and store
/// snapshot yields identical findings.
pub trait Detector: Send {
    fn id(&self) -> DetectorId;
    /// The groupings this detector wants to consume.
    fn subscriptions(&self) -> Vec<GroupingSpec>;
    fn detect(&mut self, window: &Window, stores: &StoreHandles) -> Vec<Finding>;
}

/// The full detector set, configured from one `DetectionConfig`.
pub fn default_detectors(config: &DetectionConfig) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(BeaconingDetector::new(config)),
        Box::new(ExfilDetector::new(config)),
        Box::new(ScanningDetector::new(config)),
        Box::new(C2ChannelDetector::new(config)),
        Box::new(RarityDetector::new(config)),
        Box::new(NoveltyBurstDetector::new(config)),
        Box::new(BruteForceDetector::new(config)),
        Box::new(StagingDetector::new(config)),
        Box::new(DgaDetector::new(config)),
    ]
}

pub(crate) fn evidence(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
