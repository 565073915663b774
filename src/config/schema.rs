//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! that differ from the defaults below.

use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub serial: SerialConfig,
    pub topics: TopicsConfig,
    pub timing: TimingConfig,
    pub logging: LoggingConfig,
}

/// MQTT broker connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Client id; a random `hub-test-<uuid>` is used when unset.
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            keep_alive_secs: 5,
        }
    }
}

impl BrokerConfig {
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("hub-test-{}", uuid::Uuid::new_v4()))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Serial console of the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name or alias, e.g. "/dev/ttyUSB0", "COM3" or "hub".
    pub port: Option<String>,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Per-read poll timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Bytes written after each trigger byte. The firmware treats every byte
    /// as a test id, so leave this unset unless the device expects it.
    pub terminator: Option<String>,
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout_ms: 100,
            terminator: None,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases.
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured port with aliases applied.
    pub fn resolved_port(&self) -> Option<String> {
        self.port.as_deref().map(|p| self.resolve_port(p))
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// Topics used by the echo exchange and the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// The harness publishes tokens here; the device subscribes to it.
    pub request: String,
    /// The device publishes its echo here.
    pub reply: String,
    /// Default filter for `hub-test monitor`.
    pub monitor: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            request: "/test/publish".to_string(),
            reply: "/test/subscribe".to_string(),
            monitor: "#".to_string(),
        }
    }
}

/// Deadlines and delays, all in milliseconds except the monitor duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after opening the port while the hub reboots.
    pub device_setup_ms: u64,
    pub connect_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,
    /// Upper bound on waiting for the echoed token.
    pub echo_timeout_ms: u64,
    /// Republish interval while waiting for the echo; 0 publishes once.
    pub echo_republish_ms: u64,
    /// Upper bound on waiting for the `TEST RESULT` line.
    pub result_timeout_ms: u64,
    pub monitor_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            device_setup_ms: 3_000,
            connect_timeout_ms: 5_000,
            subscribe_timeout_ms: 5_000,
            // The firmware gives Wi-Fi 5 s and the echo 10 s.
            echo_timeout_ms: 15_000,
            echo_republish_ms: 1_000,
            result_timeout_ms: 30_000,
            monitor_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn device_setup(&self) -> Duration {
        Duration::from_millis(self.device_setup_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    pub fn echo_republish(&self) -> Option<Duration> {
        (self.echo_republish_ms > 0).then(|| Duration::from_millis(self.echo_republish_ms))
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn monitor_duration(&self) -> Duration {
        Duration::from_secs(self.monitor_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or "hub_test_harness=debug".
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl Config {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::validation("broker.host", "must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::validation("broker.port", "must be non-zero"));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::validation("serial.baud", "must be non-zero"));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "serial.read_timeout_ms",
                "must be non-zero",
            ));
        }
        for (key, topic) in [
            ("topics.request", &self.topics.request),
            ("topics.reply", &self.topics.reply),
        ] {
            if topic.is_empty() {
                return Err(ConfigError::validation(key, "must not be empty"));
            }
            if topic.contains(['+', '#']) {
                return Err(ConfigError::validation(
                    key,
                    format!("'{topic}' is a filter; a concrete topic is required"),
                ));
            }
        }
        if self.topics.request == self.topics.reply {
            return Err(ConfigError::validation(
                "topics.reply",
                "must differ from topics.request or the harness receives its own token",
            ));
        }
        if self.topics.monitor.is_empty() {
            return Err(ConfigError::validation("topics.monitor", "must not be empty"));
        }
        Ok(())
    }
}

/// The flat `test/config.json` layout used by older harness setups, e.g.
/// `{"BROKER_HOST": "192.168.0.109", "BROKER_PORT": 1883, "SERIAL_PORT": "/dev/ttyUSB0"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LegacyConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub test_topic: Option<String>,
    /// Seconds.
    pub wait_time_before_test: Option<u64>,
}

impl From<LegacyConfig> for Config {
    fn from(legacy: LegacyConfig) -> Self {
        let mut config = Config::default();
        config.broker.host = legacy.broker_host;
        config.broker.port = legacy.broker_port;
        config.broker.client_id = legacy.client_id;
        config.serial.port = legacy.serial_port;
        if let Some(baud) = legacy.serial_baudrate {
            config.serial.baud = baud;
        }
        if let Some(topic) = legacy.test_topic {
            config.topics.monitor = topic;
        }
        if let Some(secs) = legacy.wait_time_before_test {
            config.timing.device_setup_ms = secs.saturating_mul(1_000);
        }
        config
    }
}
