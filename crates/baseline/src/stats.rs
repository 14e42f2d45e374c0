//! Online per-dimension statistics.
//!
//! Buckets are keyed by `(category, dimension)` and updated with a
//! Welford single-pass algorithm, so memory is proportional to the
//! number of distinct dimension keys rather than the record volume.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{read_snapshot_bytes, write_snapshot_bytes, StoreError, StoreResult};

const SHARD_COUNT: usize = 16;

/// Welford mean/variance accumulator for one dimension key.
///
/// `m2` is the running sum of squared deviations; it is persisted as-is
/// so a reloaded snapshot continues the recurrence exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
}

impl BucketStats {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Sample variance; 0.0 while fewer than two observations exist.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Key-sharded store of `BucketStats`.
///
/// Updates for the same key serialize on the shard write lock; distinct
/// keys on different shards proceed without coordination.
#[derive(Debug)]
pub struct BaselineStore {
    shards: Vec<RwLock<HashMap<(String, String), BucketStats>>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    buckets: Vec<((String, String), BucketStats)>,
}

impl BaselineStore {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, category: &str, key: &str) -> &RwLock<HashMap<(String, String), BucketStats>> {
        let mut hasher = DefaultHasher::new();
        category.hash(&mut hasher);
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Fold `value` into the bucket for `(category, key)` and return the
    /// updated statistics.
    pub fn update(&self, category: &str, key: &str, value: f64) -> BucketStats {
        let mut shard = self.shard_for(category, key).write();
        let bucket = shard
            .entry((category.to_string(), key.to_string()))
            .or_default();
        bucket.observe(value);
        *bucket
    }

    pub fn get(&self, category: &str, key: &str) -> Option<BucketStats> {
        let shard = self.shard_for(category, key).read();
        shard.get(&(category.to_string(), key.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All buckets in one category, sorted by dimension key.
    pub fn category_snapshot(&self, category: &str) -> Vec<(String, BucketStats)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.read();
            for ((cat, key), bucket) in shard.iter() {
                if cat == category {
                    out.push((key.clone(), *bucket));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Total observation count across all buckets in one category.
    pub fn category_total(&self, category: &str) -> u64 {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .iter()
                    .filter(|((cat, _), _)| cat == category)
                    .map(|(_, bucket)| bucket.count)
                    .sum::<u64>()
            })
            .sum()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let mut buckets: Vec<((String, String), BucketStats)> = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let shard = shard.read();
            for (key, bucket) in shard.iter() {
                buckets.push((key.clone(), *bucket));
            }
        }
        buckets.sort_by(|a, b| a.0.cmp(&b.0));

        let bytes = bincode::serialize(&Snapshot { buckets })
            .map_err(|err| StoreError::Serialize(err.to_string()))?;
        write_snapshot_bytes(path.as_ref(), &bytes)
    }

    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = read_snapshot_bytes(path.as_ref())?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let store = Self::new();
        for ((category, key), bucket) in snapshot.buckets {
            let mut shard = store.shard_for(&category, &key).write();
            shard.insert((category, key), bucket);
        }
        Ok(store)
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new()
    }
}
