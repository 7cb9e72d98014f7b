//! Config - Application Configuration

use crate::constants::{
    CLOUD_POLL_INTERVAL_MS, CLOUD_PROBE_INTERVAL_MS, DEFAULT_BRIDGE_ENDPOINT, DEFAULT_CLOUD_URL,
    RETRY_INITIAL_DELAY_MS, RETRY_JITTER, RETRY_MAX_DELAY_MS, RETRY_MULTIPLIER,
};
use crate::domain::profile::DeviceProfile;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Bridge server connection
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Cloud datastore connection
    #[serde(default)]
    pub cloud: CloudConfig,
    /// Logging options
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Device profile used by the `connect` command
    #[serde(default)]
    pub profile: Option<DeviceProfile>,
}

/// Bridge server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge endpoint: `http(s)://` or `ws(s)://` for Socket.IO,
    /// `tcp://` for a line-JSON bridge
    pub endpoint: String,
    /// Reconnection policy for the event channel
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BRIDGE_ENDPOINT.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

/// Serializable form of the channel retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
    /// 0 = unlimited
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: RETRY_INITIAL_DELAY_MS,
            max_delay_ms: RETRY_MAX_DELAY_MS,
            multiplier: RETRY_MULTIPLIER,
            jitter: RETRY_JITTER,
            max_attempts: 0,
        }
    }
}

/// Cloud datastore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Mirror samples and persist profiles when true
    pub enabled: bool,
    /// Realtime database base URL
    pub database_url: String,
    /// Optional database auth token
    pub auth_token: Option<String>,
    /// Reachability probe interval
    pub probe_interval_ms: u64,
    /// Watched path polling interval
    pub poll_interval_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: DEFAULT_CLOUD_URL.to_string(),
            auth_token: None,
            probe_interval_ms: CLOUD_PROBE_INTERVAL_MS,
            poll_interval_ms: CLOUD_POLL_INTERVAL_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file to the data directory
    pub file: bool,
}

impl AppConfig {
    /// The configured profile, or the stock TCP profile
    pub fn profile_or_default(&self) -> DeviceProfile {
        self.profile.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::profile::LinkSettings;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(config.bridge.endpoint, DEFAULT_BRIDGE_ENDPOINT);
        assert!(config.cloud.enabled);
        assert!(config.profile.is_none());
        assert_eq!(config.profile_or_default().address(), "192.168.1.100:502");
    }

    #[test]
    fn test_profile_section() {
        let config: AppConfig = toml::from_str(
            r#"
            [bridge]
            endpoint = "tcp://bridge.local:5000"

            [profile]
            modbusType = "rtu"
            comPort = "/dev/ttyUSB0"
            baudRate = 115200
            dataBits = 8
            parity = "N"
            stopBits = 1
            coilAddress = 7
            unitId = 2
            enableLogging = false
            "#,
        )
        .expect("parse");

        let profile = config.profile.expect("profile");
        assert!(matches!(profile.link, LinkSettings::Rtu(_)));
        assert_eq!(profile.coil_address, 7);
        assert_eq!(config.bridge.retry.max_attempts, 0);
    }
}
