//! Runtime configuration: built-in defaults, then the TOML config file,
//! then `FLOWSENTRY_*` environment overrides, validated once at startup.

mod env;
mod file;
mod load;
mod types;
mod util;

pub use types::{AnalyzerConfig, PipelineConfig, StateConfig};

#[cfg(test)]
mod tests;
