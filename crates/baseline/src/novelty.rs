//! Previously-seen identifier sets.
//!
//! Detectors ask "have we seen this destination/domain before"; the
//! pipeline appends identifiers after a window has been analyzed. On a
//! cold start (no snapshot) the first observed record opens a one-day
//! bootstrap horizon: identifiers seen inside it become baseline rather
//! than being flagged as novel.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{read_snapshot_bytes, write_snapshot_bytes, StoreError, StoreResult};

pub const BOOTSTRAP_HORIZON_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoveltyCategory {
    DstIp,
    Domain,
}

impl NoveltyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DstIp => "dst_ip",
            Self::Domain => "domain",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::DstIp => 0,
            Self::Domain => 1,
        }
    }
}

#[derive(Debug)]
pub struct NoveltyStore {
    sets: [RwLock<HashSet<String>>; 2],
    /// End of the bootstrap horizon; `None` until the first record of a
    /// cold-start stream is observed.
    bootstrap_until: RwLock<Option<i64>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    bootstrap_until: Option<i64>,
    dst_ips: Vec<String>,
    domains: Vec<String>,
}

impl NoveltyStore {
    pub fn new() -> Self {
        Self {
            sets: [RwLock::new(HashSet::new()), RwLock::new(HashSet::new())],
            bootstrap_until: RwLock::new(None),
        }
    }

    /// Advance the store clock. On the first call of a cold start this
    /// opens the bootstrap horizon; returns `true` exactly then.
    pub fn observe_clock(&self, ts_unix: i64) -> bool {
        let mut until = self.bootstrap_until.write();
        if until.is_none() {
            *until = Some(ts_unix.saturating_add(BOOTSTRAP_HORIZON_SECS));
            return true;
        }
        false
    }

    /// Whether `ts_unix` falls inside the bootstrap horizon. A store
    /// that has never seen a record is still bootstrapping.
    pub fn in_bootstrap(&self, ts_unix: i64) -> bool {
        match *self.bootstrap_until.read() {
            Some(until) => ts_unix < until,
            None => true,
        }
    }

    pub fn bootstrap_until(&self) -> Option<i64> {
        *self.bootstrap_until.read()
    }

    pub fn seen(&self, category: NoveltyCategory, id: &str) -> bool {
        self.sets[category.index()].read().contains(id)
    }

    /// Atomic check-then-insert; returns whether `id` was newly added.
    pub fn record(&self, category: NoveltyCategory, id: &str) -> bool {
        self.sets[category.index()].write().insert(id.to_string())
    }

    pub fn len(&self, category: NoveltyCategory) -> usize {
        self.sets[category.index()].read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|s| s.read().is_empty())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let mut dst_ips: Vec<String> = self.sets[NoveltyCategory::DstIp.index()]
            .read()
            .iter()
            .cloned()
            .collect();
        let mut domains: Vec<String> = self.sets[NoveltyCategory::Domain.index()]
            .read()
            .iter()
            .cloned()
            .collect();
        dst_ips.sort();
        domains.sort();

        let snapshot = Snapshot {
            bootstrap_until: self.bootstrap_until(),
            dst_ips,
            domains,
        };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|err| StoreError::Serialize(err.to_string()))?;
        write_snapshot_bytes(path.as_ref(), &bytes)
    }

    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = read_snapshot_bytes(path.as_ref())?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let store = Self::new();
        *store.bootstrap_until.write() = snapshot.bootstrap_until;
        store.sets[NoveltyCategory::DstIp.index()]
            .write()
            .extend(snapshot.dst_ips);
        store.sets[NoveltyCategory::Domain.index()]
            .write()
            .extend(snapshot.domains);
        Ok(store)
    }
}

impl Default for NoveltyStore {
    fn default() -> Self {
        Self::new()
    }
}
