//! Engine configuration.
//!
//! Read from `config.json` in the pm directory when present; every field has
//! a default so a partial or missing file is fine.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Treat constraint violations as blocking when adding dependencies.
    pub strict: bool,
    /// Write activity entries to the sink. Entries are still returned to callers.
    pub record_activity: bool,
    /// Actor recorded when the caller does not name one.
    pub default_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            strict: false,
            record_activity: true,
            default_actor: "system".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load `config.json` from the directory, or defaults if it is absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(EngineConfig::default());
        }
        let buf = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&buf)?)
    }
}
