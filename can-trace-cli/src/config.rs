//! Configuration file loading
//!
//! ```toml
//! [capture]
//! dump_path = "can_dump.jsonl"
//! policy = "append"
//! trace_id = 768
//!
//! [batch]
//! directory = "dumps"
//! parallel = false
//! ```

use anyhow::{Context, Result};
use can_trace::{BatchConfig, CaptureConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
