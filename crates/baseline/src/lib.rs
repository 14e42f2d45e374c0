//! Shared analytic state for the flow detectors: online per-dimension
//! statistics (`BaselineStore`) and previously-seen identifier sets
//! (`NoveltyStore`), both with bincode snapshot persistence.

use std::fmt;
use std::path::{Path, PathBuf};

mod novelty;
mod stats;

pub use novelty::{NoveltyCategory, NoveltyStore, BOOTSTRAP_HORIZON_SECS};
pub use stats::{BaselineStore, BucketStats};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    /// No snapshot exists at the given path. Callers decide whether this
    /// means a first run (bootstrap) or a misconfigured path.
    Missing(PathBuf),
    /// A snapshot exists but cannot be decoded. Never silently discarded.
    Corrupt(String),
    Serialize(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Missing(path) => write!(f, "no snapshot at {}", path.display()),
            Self::Corrupt(msg) => write!(f, "corrupt snapshot: {}", msg),
            Self::Serialize(msg) => write!(f, "serialize error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub(crate) fn read_snapshot_bytes(path: &Path) -> StoreResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::Missing(path.to_path_buf()))
        }
        Err(err) => Err(StoreError::Io(err)),
    }
}

pub(crate) fn write_snapshot_bytes(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests;
