//! Orchestrator configuration model

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs read by the core. The core never writes them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Maximum number of open views across all servers
    pub view_limit: usize,
    /// Foreground retry budget for transient load failures
    pub max_server_retries: u32,
    /// Interval between foreground retries and between background probes
    #[serde(rename = "reloadIntervalMs", with = "crate::utils::duration_ms")]
    pub reload_interval: Duration,
    /// How long to wait for the web app's ready signal before showing it anyway
    #[serde(rename = "readyTimeoutMs", with = "crate::utils::duration_ms")]
    pub ready_timeout: Duration,
    /// Minimum gap between two content-initiated popouts
    #[serde(rename = "popoutRateLimitMs", with = "crate::utils::duration_ms")]
    pub popout_rate_limit: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            view_limit: 15,
            max_server_retries: 3,
            reload_interval: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(4),
            popout_rate_limit: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{"viewLimit":4}"#).unwrap();
        assert_eq!(config.view_limit, 4);
        assert_eq!(config.max_server_retries, 3);
        assert_eq!(config.reload_interval, Duration::from_secs(10));
    }

    #[test]
    fn durations_are_milliseconds() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"reloadIntervalMs":500,"readyTimeoutMs":250}"#).unwrap();
        assert_eq!(config.reload_interval, Duration::from_millis(500));
        assert_eq!(config.ready_timeout, Duration::from_millis(250));

        let json = serde_json::to_value(OrchestratorConfig::default()).unwrap();
        assert_eq!(json["popoutRateLimitMs"], 1000);
    }
}
