//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_MAX_DEPTH;
use crate::{Error, Result};

/// Query-layer settings. Every field has a default, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ancestor hops allowed when resolving a path.
    pub max_path_depth: usize,
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_path_depth: DEFAULT_MAX_DEPTH,
            watch: WatchConfig::default(),
        }
    }
}

/// Watch stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Events buffered per subscription before it counts as lagging.
    pub subscriber_buffer: usize,
    /// Start every watch with a snapshot, even without `X-Watch: snapshot`.
    pub snapshot: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { subscriber_buffer: 256, snapshot: false }
    }
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(raw).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_path_depth == 0 {
            return Err(Error::Config("max_path_depth must be > 0".into()));
        }
        if self.watch.subscriber_buffer == 0 {
            return Err(Error::Config("watch.subscriber_buffer must be > 0".into()));
        }
        Ok(())
    }
}
