//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LegacyConfig};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "HUB_TEST";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "HUB_TEST_CONFIG";

/// Files looked for in the working directory, in order.
const LOCAL_CONFIG_FILES: &[&str] = &["hub-test.json", "hub-test.toml", "test/config.json"];

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `HUB_TEST_CONFIG` environment variable (explicit path)
    /// 2. `./hub-test.json`, `./hub-test.toml`, `./test/config.json`
    /// 3. `config.json` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(explicit) => {
                let path = PathBuf::from(explicit);
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                Some(path)
            }
            Err(_) => resolve_config_path(),
        };

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Find the first existing config file in the working directory or the
/// platform config directory.
pub fn resolve_config_path() -> Option<PathBuf> {
    LOCAL_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .chain(get_default_config_path())
        .find(|path| path.exists())
}

/// `~/.config/hub-test/config.json` on Linux, the equivalent elsewhere.
pub fn get_default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hub-test")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

/// Parse a config file, choosing the format by extension (TOML for `.toml`,
/// JSON otherwise).
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        toml::from_str(&content).map_err(|source| ConfigError::TomlError {
            path: path.to_path_buf(),
            source,
        })
    } else {
        parse_json(&content).map_err(|source| ConfigError::JsonError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Accept both the sectioned schema and the flat legacy document.
pub fn parse_json(content: &str) -> Result<Config, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.get("BROKER_HOST").is_some() {
        let legacy: LegacyConfig = serde_json::from_value(value)?;
        Ok(legacy.into())
    } else {
        serde_json::from_value(value)
    }
}

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{}_{}", ENV_PREFIX, key);
    std::env::var(&name).ok().map(|val| (name, val))
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str, what: &str) -> ConfigResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(name, format!("Invalid {what}: '{val}'")))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `HUB_TEST_<SECTION>_<KEY>`, e.g.
/// `HUB_TEST_BROKER_HOST=192.168.0.109` or `HUB_TEST_SERIAL_PORT=COM15`.
/// Every scalar key is covered except the serial line settings and port
/// aliases, which are file-only. The hardware-test variables `TEST_PORT` and
/// `TEST_BAUD` are honored too.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some((_, val)) = env_var("BROKER_HOST") {
        config.broker.host = val;
    }
    if let Some((name, val)) = env_var("BROKER_PORT") {
        config.broker.port = parse_env(&name, &val, "port number")?;
    }
    if let Some((_, val)) = env_var("BROKER_CLIENT_ID") {
        config.broker.client_id = Some(val);
    }
    if let Some((name, val)) = env_var("BROKER_KEEP_ALIVE_SECS") {
        config.broker.keep_alive_secs = parse_env(&name, &val, "keep-alive")?;
    }

    if let Some((_, val)) = env_var("SERIAL_PORT").or_else(|| {
        std::env::var("TEST_PORT")
            .ok()
            .map(|v| ("TEST_PORT".to_string(), v))
    }) {
        config.serial.port = Some(val);
    }
    if let Some((name, val)) = env_var("SERIAL_BAUD").or_else(|| {
        std::env::var("TEST_BAUD")
            .ok()
            .map(|v| ("TEST_BAUD".to_string(), v))
    }) {
        config.serial.baud = parse_env(&name, &val, "baud rate")?;
    }
    if let Some((name, val)) = env_var("SERIAL_READ_TIMEOUT_MS") {
        config.serial.read_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((_, val)) = env_var("SERIAL_TERMINATOR") {
        // Empty clears a terminator set in the file.
        config.serial.terminator = Some(val).filter(|t| !t.is_empty());
    }

    if let Some((_, val)) = env_var("TOPICS_REQUEST") {
        config.topics.request = val;
    }
    if let Some((_, val)) = env_var("TOPICS_REPLY") {
        config.topics.reply = val;
    }
    if let Some((_, val)) = env_var("TOPICS_MONITOR") {
        config.topics.monitor = val;
    }

    if let Some((name, val)) = env_var("TIMING_CONNECT_TIMEOUT_MS") {
        config.timing.connect_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("TIMING_SUBSCRIBE_TIMEOUT_MS") {
        config.timing.subscribe_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("TIMING_ECHO_REPUBLISH_MS") {
        config.timing.echo_republish_ms = parse_env(&name, &val, "interval")?;
    }
    if let Some((name, val)) = env_var("TIMING_MONITOR_SECS") {
        config.timing.monitor_secs = parse_env(&name, &val, "duration")?;
    }

    if let Some((name, val)) = env_var("TIMING_ECHO_TIMEOUT_MS") {
        config.timing.echo_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("TIMING_RESULT_TIMEOUT_MS") {
        config.timing.result_timeout_ms = parse_env(&name, &val, "timeout")?;
    }
    if let Some((name, val)) = env_var("TIMING_DEVICE_SETUP_MS") {
        config.timing.device_setup_ms = parse_env(&name, &val, "delay")?;
    }

    if let Some((_, val)) = env_var("LOGGING_LEVEL").or_else(|| env_var("LOG_LEVEL")) {
        config.logging.level = val;
    }
    if let Some((name, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = parse_env(&name, &val, "log format")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().broker.port, 1883);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("HUB_TEST_BROKER_PORT", "18830");
        env::set_var("HUB_TEST_BROKER_HOST", "broker.lan");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().broker.port, 18830);
        assert_eq!(loader.config().broker.host, "broker.lan");

        env::remove_var("HUB_TEST_BROKER_PORT");
        env::remove_var("HUB_TEST_BROKER_HOST");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("HUB_TEST_BROKER_PORT", "not-a-port");

        let err = ConfigLoader::with_defaults().unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { ref var, .. } if var == "HUB_TEST_BROKER_PORT"));

        env::remove_var("HUB_TEST_BROKER_PORT");
    }

    #[test]
    #[serial]
    fn test_legacy_test_port_env() {
        env::set_var("TEST_PORT", "COM99");
        env::set_var("TEST_BAUD", "57600");

        let loader = ConfigLoader::with_defaults().unwrap();
        assert_eq!(loader.config().serial.port.as_deref(), Some("COM99"));
        assert_eq!(loader.config().serial.baud, 57600);

        env::remove_var("TEST_PORT");
        env::remove_var("TEST_BAUD");
    }

    #[test]
    #[serial]
    fn test_timing_topic_and_logging_env_overrides() {
        let vars = [
            ("HUB_TEST_BROKER_KEEP_ALIVE_SECS", "30"),
            ("HUB_TEST_SERIAL_READ_TIMEOUT_MS", "250"),
            ("HUB_TEST_SERIAL_TERMINATOR", "\n"),
            ("HUB_TEST_TOPICS_MONITOR", "/mikettle/#"),
            ("HUB_TEST_TIMING_CONNECT_TIMEOUT_MS", "1500"),
            ("HUB_TEST_TIMING_SUBSCRIBE_TIMEOUT_MS", "2500"),
            ("HUB_TEST_TIMING_ECHO_REPUBLISH_MS", "0"),
            ("HUB_TEST_TIMING_MONITOR_SECS", "90"),
            ("HUB_TEST_LOGGING_FORMAT", "JSON"),
        ];
        for (var, val) in vars {
            env::set_var(var, val);
        }

        let loaded = ConfigLoader::with_defaults();
        for (var, _) in vars {
            env::remove_var(var);
        }
        let config = loaded.unwrap().into_config();

        assert_eq!(config.broker.keep_alive_secs, 30);
        assert_eq!(config.serial.read_timeout_ms, 250);
        assert_eq!(config.serial.terminator.as_deref(), Some("\n"));
        assert_eq!(config.topics.monitor, "/mikettle/#");
        assert_eq!(config.timing.connect_timeout_ms, 1500);
        assert_eq!(config.timing.subscribe_timeout_ms, 2500);
        assert_eq!(config.timing.echo_republish(), None);
        assert_eq!(config.timing.monitor_secs, 90);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    #[serial]
    fn test_bad_log_format_env_is_reported() {
        env::set_var("HUB_TEST_LOGGING_FORMAT", "colourful");
        let err = ConfigLoader::with_defaults().unwrap_err();
        env::remove_var("HUB_TEST_LOGGING_FORMAT");
        assert!(matches!(err, ConfigError::EnvParseError { ref var, .. } if var == "HUB_TEST_LOGGING_FORMAT"));
    }

    #[test]
    fn test_parse_json_detects_legacy_layout() {
        let config =
            parse_json(r#"{"BROKER_HOST": "10.0.0.2", "BROKER_PORT": 1884}"#).unwrap();
        assert_eq!(config.broker.host, "10.0.0.2");
        assert_eq!(config.broker.port, 1884);

        let config = parse_json(r#"{"broker": {"host": "10.0.0.3"}}"#).unwrap();
        assert_eq!(config.broker.host, "10.0.0.3");
    }
}
