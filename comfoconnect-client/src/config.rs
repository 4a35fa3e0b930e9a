//! Configuration loading for the ComfoConnect client.
//!
//! Settings come from a TOML file or from `COMFOCONNECT_*` environment
//! variables. Durations are written in milliseconds.
//!
//! ```toml
//! [bridge]
//! host = "192.168.1.213"
//! id = "0000000000251010800170b3d54264b4"
//!
//! [session]
//! local_id = "00000000000000000000000000001337"
//! device_name = "living-room-panel"
//! pin = 0
//! reply_timeout_ms = 5000
//! keepalive_interval_ms = 60000
//! reference_width = 32
//! ```

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};

use comfoconnect_protocol::DeviceId;

use crate::client::ReferenceWidth;
use crate::error::{ClientError, Result};

/// Identity used when none is configured.
pub const DEFAULT_LOCAL_ID: DeviceId = DeviceId([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x13, 0x37,
]);

/// Where the bridge lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: Option<IpAddr>,
    /// Learned by a unicast discovery probe when absent.
    pub id: Option<DeviceId>,
}

/// Session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub local_id: DeviceId,
    pub device_name: String,
    pub pin: u32,
    #[serde(rename = "connect_timeout_ms", deserialize_with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "reply_timeout_ms", deserialize_with = "millis")]
    pub reply_timeout: Duration,
    /// Upper bound on one blocking read in the background reader.
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "keepalive_interval_ms", deserialize_with = "millis")]
    pub keepalive_interval: Duration,
    #[serde(rename = "reconnect_delay_ms", deserialize_with = "millis")]
    pub reconnect_delay: Duration,
    /// How long `connect` waits for the background reader to come up.
    #[serde(rename = "ready_timeout_ms", deserialize_with = "millis")]
    pub ready_timeout: Duration,
    pub reference_width: ReferenceWidth,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_id: DEFAULT_LOCAL_ID,
            device_name: "comfoconnect-rs".to_string(),
            pin: 0,
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            reference_width: ReferenceWidth::default(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub bridge: BridgeConfig,
    pub session: SessionConfig,
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Parse configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<ClientConfig> {
    toml::from_str(contents).map_err(|e| ClientError::Config(e.to_string()))
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
    let config = parse_config(&contents)?;
    debug!(
        "Configuration loaded from {}: bridge={:?}",
        path.display(),
        config.bridge.host
    );
    Ok(config)
}

/// Load configuration from the file if given and readable, otherwise from
/// environment variables and defaults.
pub fn load_config_or_env(path: Option<&Path>) -> ClientConfig {
    if let Some(path) = path {
        match load_config(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                return config;
            }
            Err(e) => warn!("Failed to load config file: {}", e),
        }
    }

    load_from_env()
}

/// Load configuration from environment variables.
pub fn load_from_env() -> ClientConfig {
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup<F>(lookup: F) -> ClientConfig
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = |key: &str| -> Option<String> {
        let value = lookup(key)?;
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    };
    let duration = |key: &str, default: Duration| {
        parsed(key)
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(default)
    };

    let defaults = SessionConfig::default();

    let bridge = BridgeConfig {
        host: parsed("COMFOCONNECT_HOST").and_then(|s| s.parse().ok()),
        id: parsed("COMFOCONNECT_BRIDGE_ID").and_then(|s| s.parse().ok()),
    };

    let session = SessionConfig {
        local_id: parsed("COMFOCONNECT_LOCAL_ID")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.local_id),
        device_name: parsed("COMFOCONNECT_DEVICE_NAME").unwrap_or(defaults.device_name),
        pin: parsed("COMFOCONNECT_PIN")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pin),
        connect_timeout: duration("COMFOCONNECT_CONNECT_TIMEOUT", defaults.connect_timeout),
        reply_timeout: duration("COMFOCONNECT_REPLY_TIMEOUT", defaults.reply_timeout),
        poll_interval: duration("COMFOCONNECT_POLL_INTERVAL", defaults.poll_interval),
        keepalive_interval: duration("COMFOCONNECT_KEEPALIVE", defaults.keepalive_interval),
        reconnect_delay: duration("COMFOCONNECT_RECONNECT_DELAY", defaults.reconnect_delay),
        ready_timeout: duration("COMFOCONNECT_READY_TIMEOUT", defaults.ready_timeout),
        reference_width: parsed("COMFOCONNECT_REFERENCE_WIDTH")
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(|bits| ReferenceWidth::try_from(bits).ok())
            .unwrap_or(defaults.reference_width),
    };

    debug!(
        "Using environment/default config: bridge={:?}, device_name={}",
        bridge.host, session.device_name
    );

    ClientConfig { bridge, session }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
[bridge]
host = "192.168.1.213"
id = "0000000000251010800170b3d54264b4"

[session]
device_name = "panel"
pin = 1234
reply_timeout_ms = 2500
reference_width = 16
"#,
        )
        .unwrap();

        assert_eq!(config.bridge.host, Some("192.168.1.213".parse().unwrap()));
        assert_eq!(
            config.bridge.id,
            Some("0000000000251010800170b3d54264b4".parse().unwrap())
        );
        assert_eq!(config.session.device_name, "panel");
        assert_eq!(config.session.pin, 1234);
        assert_eq!(config.session.reply_timeout, Duration::from_millis(2500));
        assert_eq!(config.session.reference_width, ReferenceWidth::Bits16);
        // Untouched keys keep their defaults
        assert_eq!(config.session.keepalive_interval, Duration::from_secs(60));
        assert_eq!(config.session.local_id, DEFAULT_LOCAL_ID);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_bad_reference_width() {
        let result = parse_config("[session]\nreference_width = 24\n");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("COMFOCONNECT_HOST", "10.0.0.5"),
            ("COMFOCONNECT_PIN", "4321"),
            ("COMFOCONNECT_KEEPALIVE", "30000"),
            ("COMFOCONNECT_DEVICE_NAME", " "),
        ]
        .into_iter()
        .collect();
        let config = from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bridge.host, Some("10.0.0.5".parse().unwrap()));
        assert_eq!(config.bridge.id, None);
        assert_eq!(config.session.pin, 4321);
        assert_eq!(config.session.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.session.device_name, "comfoconnect-rs");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_config_or_env(Some(Path::new("/nonexistent/comfoconnect.toml")));
        assert!(config.session.reply_timeout > Duration::ZERO);
    }
}
