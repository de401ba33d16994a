//! Configuration management for softwatchd.
//!
//! Loads settings from /etc/softwatch/config.toml, then softwatch.toml in
//! the working directory, or uses defaults. The defaults reproduce the
//! production deployment: 30 s polling cadence, 100 pb^-1 budget, and the
//! WBM and pixel-supervisor endpoints.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/softwatch/config.toml";

/// Fallback config file path next to the binary
pub const LOCAL_CONFIG_PATH: &str = "softwatch.toml";

/// Polling cadence and transport limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between the end of one evaluation and the start of the next
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-request timeout for every remote call, seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Trigger policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Integrated luminosity budget between detections, inverse picobarn
    #[serde(default = "default_lumi_threshold")]
    pub lumi_threshold_pb: f64,

    /// Pause after a live control call before the tick completes, seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// When true, log the would-be control call instead of sending it
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_lumi_threshold() -> f64 {
    100.0
}

fn default_cooldown() -> u64 {
    60
}

fn default_dry_run() -> bool {
    true
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lumi_threshold_pb: default_lumi_threshold(),
            cooldown_secs: default_cooldown(),
            dry_run: default_dry_run(),
        }
    }
}

/// Remote endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// PageZero monitoring view
    #[serde(default = "default_monitoring_url")]
    pub monitoring_url: String,

    /// Pixel supervisor status page
    #[serde(default = "default_supervisor_status_url")]
    pub supervisor_status_url: String,

    /// Run-parameter table, parameterized by run number
    #[serde(default = "default_run_parameters_url")]
    pub run_parameters_url: String,

    /// Pixel supervisor state-machine handler
    #[serde(default = "default_control_url")]
    pub control_url: String,
}

fn default_monitoring_url() -> String {
    "http://cmswbm.cms/cmsdb/servlet/PageZero".to_string()
}

fn default_supervisor_status_url() -> String {
    "http://srv-s2b18-10-01.cms:1970/urn:xdaq-application:lid=51/Default".to_string()
}

fn default_run_parameters_url() -> String {
    "http://cmswbm.cms/cmsdb/servlet/RunParameters".to_string()
}

fn default_control_url() -> String {
    "http://srv-s2b18-10-01.cms:1970/urn:xdaq-application:lid=51/StateMachineXgiHandler".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            monitoring_url: default_monitoring_url(),
            supervisor_status_url: default_supervisor_status_url(),
            run_parameters_url: default_run_parameters_url(),
            control_url: default_control_url(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl Config {
    /// Load config from the usual paths, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(LOCAL_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from a specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.request_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.detection.cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.poll_interval_secs, 30);
        assert_eq!(config.daemon.request_timeout_secs, 10);
        assert_eq!(config.detection.lumi_threshold_pb, 100.0);
        assert_eq!(config.detection.cooldown_secs, 60);
        assert!(config.detection.dry_run);
        assert!(config.endpoints.monitoring_url.ends_with("/PageZero"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[detection]
lumi_threshold_pb = 250.0
dry_run = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.lumi_threshold_pb, 250.0);
        assert!(!config.detection.dry_run);
        // Defaults for everything else
        assert_eq!(config.detection.cooldown_secs, 60);
        assert_eq!(config.daemon.poll_interval_secs, 30);
    }

    #[test]
    fn test_parse_endpoint_overrides() {
        let toml_str = r#"
[endpoints]
monitoring_url = "http://testbench.local/PageZero"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoints.monitoring_url, "http://testbench.local/PageZero");
        assert!(config.endpoints.control_url.ends_with("StateMachineXgiHandler"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\npoll_interval_secs = 5").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.daemon.poll_interval_secs, 5);
        assert_eq!(config.daemon.request_timeout_secs, 10);
    }

    #[test]
    fn test_load_from_missing_path_is_err() {
        assert!(Config::load_from_path("/nonexistent/softwatch.toml").is_err());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.cooldown(), Duration::from_secs(60));
    }
}
