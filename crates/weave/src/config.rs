//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Controls how much detail error pages reveal.
    pub mode: BuildMode,
    /// Items materialized beyond each edge of a virtualized viewport.
    pub overscan: usize,
    /// Channel name sent with derived requests so the backend can push
    /// partial results back.
    pub ws_channel: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: BuildMode::Development,
            overscan: 3,
            ws_channel: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn is_production(&self) -> bool {
        self.mode == BuildMode::Production
    }
}
