//! Bus configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the in-process bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// How long `invoke` waits for a handler before failing, in milliseconds
    #[serde(rename = "invoke-timeout-ms", default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,

    /// Per-endpoint delivery queue size
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_invoke_timeout_ms() -> u64 {
    debug!("default_invoke_timeout_ms: called");
    30_000
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        debug!("BusConfig::default: called");
        Self {
            invoke_timeout_ms: 30_000,
            channel_buffer: 1000,
        }
    }
}

impl BusConfig {
    /// Get the invoke timeout as a Duration
    pub fn invoke_timeout(&self) -> Duration {
        debug!(invoke_timeout_ms = %self.invoke_timeout_ms, "BusConfig::invoke_timeout: called");
        Duration::from_millis(self.invoke_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.invoke_timeout_ms, 30_000);
        assert_eq!(config.channel_buffer, 1000);
    }

    #[test]
    fn test_invoke_timeout_duration() {
        let config = BusConfig {
            invoke_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.invoke_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: BusConfig = serde_yaml::from_str("invoke-timeout-ms: 500\n").unwrap();
        assert_eq!(config.invoke_timeout_ms, 500);
        assert_eq!(config.channel_buffer, 1000);
    }
}
