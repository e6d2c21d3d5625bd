//! Tunable defaults for the retry/backoff chain, loadable from an optional
//! TOML file.
//!
//! This does not touch the wire protocol: it only adjusts how patient the
//! client is before giving up.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TftpError};
use crate::session::{DEFAULT_BACKOFF, DEFAULT_RETRIES};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retries after the initial send before giving up.
    pub retries: u32,
    /// Initial retransmission interval in milliseconds, doubled on each
    /// retry.
    pub initial_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            initial_backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

pub fn load_config(path: &std::path::Path) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents)
        .map_err(|e| TftpError::Other(anyhow::anyhow!("invalid config file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.retries, 6);
        assert_eq!(config.initial_backoff(), Duration::from_millis(50));
    }

    #[test]
    fn parses_minimal_toml() {
        let config: EngineConfig = toml::from_str("retries = 3\ninitial_backoff_ms = 100\n").unwrap();
        assert_eq!(config.retries, 3);
        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.retries, DEFAULT_RETRIES);
    }
}
