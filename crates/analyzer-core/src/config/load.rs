use anyhow::{Context, Result};

use super::types::AnalyzerConfig;

impl AnalyzerConfig {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_file_config()?;
        cfg.apply_env_overrides();
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}
