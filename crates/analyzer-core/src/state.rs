//! Store lifecycle: load snapshots at startup, persist them at
//! shutdown. A missing snapshot bootstraps an empty store; a snapshot
//! that exists but cannot be decoded is fatal.

use std::sync::Arc;

use anyhow::{Context, Result};
use baseline::{BaselineStore, NoveltyCategory, NoveltyStore, StoreError};
use detection::StoreHandles;
use tracing::{info, warn};

use crate::config::StateConfig;

pub fn load_or_bootstrap(config: &StateConfig) -> Result<StoreHandles> {
    let baselines = match BaselineStore::load(&config.baselines_path) {
        Ok(store) => store,
        Err(StoreError::Missing(path)) => {
            warn!(path = %path.display(), "baseline snapshot missing; starting empty");
            BaselineStore::new()
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed loading baseline snapshot {}",
                    config.baselines_path.display()
                )
            })
        }
    };

    let novelty = match NoveltyStore::load(&config.novelty_path) {
        Ok(store) => store,
        Err(StoreError::Missing(path)) => {
            warn!(path = %path.display(), "novelty snapshot missing; starting empty");
            NoveltyStore::new()
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed loading novelty snapshot {}",
                    config.novelty_path.display()
                )
            })
        }
    };

    Ok(StoreHandles::new(Arc::new(baselines), Arc::new(novelty)))
}

pub fn persist(config: &StateConfig, stores: &StoreHandles) -> Result<()> {
    stores
        .baselines
        .save(&config.baselines_path)
        .with_context(|| {
            format!(
                "failed writing baseline snapshot {}",
                config.baselines_path.display()
            )
        })?;
    stores.novelty.save(&config.novelty_path).with_context(|| {
        format!(
            "failed writing novelty snapshot {}",
            config.novelty_path.display()
        )
    })?;

    info!(
        baseline_buckets = stores.baselines.len(),
        novel_dst_ips = stores.novelty.len(NoveltyCategory::DstIp),
        novel_domains = stores.novelty.len(NoveltyCategory::Domain),
        "state snapshots written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;

    fn state_config(dir: &std::path::Path) -> StateConfig {
        StateConfig {
            baselines_path: dir.join("baselines.bin"),
            novelty_path: dir.join("novelty.bin"),
        }
    }

    #[test]
    fn missing_snapshots_bootstrap_empty_stores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stores = load_or_bootstrap(&state_config(dir.path())).expect("bootstrap");
        assert!(stores.baselines.is_empty());
        assert!(stores.novelty.is_empty());
    }

    #[test]
    fn persist_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = state_config(dir.path());

        let stores = load_or_bootstrap(&config).expect("bootstrap");
        stores.baselines.update("bytes_out_hourly", "10.0.0.5|09", 120.0);
        stores.novelty.record(NoveltyCategory::DstIp, "203.0.113.9");
        persist(&config, &stores).expect("persist");

        let reloaded = load_or_bootstrap(&config).expect("reload");
        assert_eq!(reloaded.baselines.len(), 1);
        assert!(reloaded.novelty.seen(NoveltyCategory::DstIp, "203.0.113.9"));
    }

    #[test]
    fn corrupt_snapshot_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = state_config(dir.path());
        std::fs::write(&config.baselines_path, b"not a snapshot").expect("write");

        assert!(load_or_bootstrap(&config).is_err());
    }
}
