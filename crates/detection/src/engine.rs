//! Synchronous composition of the analytics core: the grouping engines
//! for every subscribed spec, the detector set, and the shared stores.
//!
//! `ingest` returns the findings produced by any windows the record
//! closed; `drain` flushes everything at stream end. The async pipeline
//! in the analyzer binary reproduces the same routing with the stages
//! split across tasks; the helpers at the bottom are shared with it.

use std::collections::HashMap;

use baseline::NoveltyCategory;

use crate::config::DetectionConfig;
use crate::detectors::{
    default_detectors, hourly_key, Detector, StoreHandles, CAT_BYTES_OUT_HOURLY, CAT_PROTO_PORT,
};
use crate::types::{Finding, FlowRecord};
use crate::window::{
    FlushPolicy, GroupingEngine, GroupingSpec, KeySpec, OutOfOrderRecord, Window,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub records: u64,
    pub rejected: u64,
    pub windows: u64,
}

pub struct DetectionEngine {
    engines: Vec<GroupingEngine>,
    /// Detector indices subscribed to each engine, parallel to `engines`.
    subscribers: Vec<Vec<usize>>,
    detectors: Vec<Box<dyn Detector>>,
    stores: StoreHandles,
    reorder_tolerance_secs: i64,
    max_observed_ts: i64,
    counters: EngineCounters,
}

impl DetectionEngine {
    pub fn new(config: &DetectionConfig, stores: StoreHandles) -> Self {
        Self::with_detectors(config, stores, default_detectors(config))
    }

    pub fn with_detectors(
        config: &DetectionConfig,
        stores: StoreHandles,
        detectors: Vec<Box<dyn Detector>>,
    ) -> Self {
        let mut engines: Vec<GroupingEngine> = Vec::new();
        let mut subscribers: Vec<Vec<usize>> = Vec::new();
        for (idx, detector) in detectors.iter().enumerate() {
            for spec in detector.subscriptions() {
                match engines.iter().position(|e| e.spec() == spec) {
                    Some(pos) => subscribers[pos].push(idx),
                    None => {
                        engines.push(GroupingEngine::new(spec, config.reorder_tolerance_secs));
                        subscribers.push(vec![idx]);
                    }
                }
            }
        }

        Self {
            engines,
            subscribers,
            detectors,
            stores,
            reorder_tolerance_secs: config.reorder_tolerance_secs,
            max_observed_ts: i64::MIN,
            counters: EngineCounters::default(),
        }
    }

    pub fn stores(&self) -> &StoreHandles {
        &self.stores
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    pub fn subscribed_specs(&self) -> Vec<GroupingSpec> {
        self.engines.iter().map(|e| e.spec()).collect()
    }

    /// Ingest one record. The reorder check runs before any state is
    /// touched, so a rejected record leaves no trace anywhere.
    pub fn ingest(&mut self, record: &FlowRecord) -> Result<Vec<Finding>, OutOfOrderRecord> {
        let horizon = self.max_observed_ts.saturating_sub(self.reorder_tolerance_secs);
        if record.start_unix < horizon {
            self.counters.rejected += 1;
            return Err(OutOfOrderRecord {
                ts: record.start_unix,
                horizon,
            });
        }
        self.max_observed_ts = self.max_observed_ts.max(record.start_unix);
        self.counters.records += 1;

        self.stores.novelty.observe_clock(record.start_unix);
        apply_record_baselines(&self.stores, record);

        let mut findings = Vec::new();
        for idx in 0..self.engines.len() {
            // The shared horizon check above is at least as strict as
            // each engine's own, so ingest cannot fail here.
            if let Ok(Some(window)) = self.engines[idx].ingest(record) {
                self.dispatch(idx, &window, &mut findings);
            }
        }
        Ok(findings)
    }

    /// Flush all open windows through the detectors at stream end.
    pub fn drain(&mut self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for idx in 0..self.engines.len() {
            for window in self.engines[idx].drain() {
                self.dispatch(idx, &window, &mut findings);
            }
        }
        findings
    }

    fn dispatch(&mut self, engine_idx: usize, window: &Window, findings: &mut Vec<Finding>) {
        self.counters.windows += 1;
        for &det_idx in &self.subscribers[engine_idx] {
            findings.extend(self.detectors[det_idx].detect(window, &self.stores));
        }
        if is_novelty_recording_spec(window.spec()) {
            record_window_identifiers(&self.stores, window);
        }
    }
}

/// Per-record baseline updates: the per-(source, hour-of-day) outbound
/// volume bucket and the global (protocol, dst port) frequency table.
/// One writer path per dimension key.
pub fn apply_record_baselines(stores: &StoreHandles, record: &FlowRecord) {
    stores.baselines.update(
        CAT_BYTES_OUT_HOURLY,
        &hourly_key(record),
        record.bytes_out as f64,
    );
    stores
        .baselines
        .update(CAT_PROTO_PORT, &record.proto_port_key(), 1.0);
}

/// Identifier recording runs once per flow, after the per-source gap
/// grouping's window has been analyzed, so the novelty detector reads a
/// consistent "before this window" view.
pub fn is_novelty_recording_spec(spec: GroupingSpec) -> bool {
    spec.key == KeySpec::Source && matches!(spec.policy, FlushPolicy::Gap { .. })
}

pub fn record_window_identifiers(stores: &StoreHandles, window: &Window) {
    for record in window.records() {
        stores
            .novelty
            .record(NoveltyCategory::DstIp, &record.dst_ip.to_string());
        if let Some(domain) = record.domain.as_deref() {
            stores.novelty.record(NoveltyCategory::Domain, domain);
        }
    }
}
