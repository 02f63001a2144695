use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tree: TreeConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Configuration of the node tree and its propagation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Longest chain of dependents a single change may walk through.
    pub max_cascade_depth: usize,
    /// Refresh the change sink once per mutation instead of once per
    /// recomputed dependent.
    pub coalesce_notifications: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 64,
            coalesce_notifications: true,
        }
    }
}
