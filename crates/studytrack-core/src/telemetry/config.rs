//! Collector configuration.

use serde::{Deserialize, Serialize};

/// Maximum number of records kept per stream.
pub const MAX_RECORDS_PER_STREAM: usize = 1000;

/// Default threshold for slow call warnings (in milliseconds).
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 1000.0;

/// Configuration for metrics collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether to store records at all. Tracked operations still run when off.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Capacity of the performance stream.
    #[serde(default = "default_capacity")]
    pub max_performance_metrics: usize,

    /// Capacity of the user-experience stream.
    #[serde(default = "default_capacity")]
    pub max_ux_metrics: usize,

    /// Tracked calls slower than this are logged and tagged `slow`.
    #[serde(default = "default_slow_threshold")]
    pub slow_call_threshold_ms: f64,

    /// Record navigation entries from the timing platform.
    #[serde(default = "default_true")]
    pub observe_navigation: bool,

    /// Record measure entries from the timing platform.
    #[serde(default = "default_true")]
    pub observe_measures: bool,
}

fn default_true() -> bool {
    true
}
fn default_capacity() -> usize {
    MAX_RECORDS_PER_STREAM
}
fn default_slow_threshold() -> f64 {
    DEFAULT_SLOW_THRESHOLD_MS
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_performance_metrics: MAX_RECORDS_PER_STREAM,
            max_ux_metrics: MAX_RECORDS_PER_STREAM,
            slow_call_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            observe_navigation: true,
            observe_measures: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = TelemetryConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_performance_metrics, 1000);
        assert_eq!(cfg.max_ux_metrics, 1000);
        assert_eq!(cfg.slow_call_threshold_ms, 1000.0);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: TelemetryConfig = toml::from_str("max_ux_metrics = 50").unwrap();
        assert_eq!(cfg.max_ux_metrics, 50);
        assert_eq!(cfg.max_performance_metrics, 1000);
        assert!(cfg.observe_measures);
    }
}
