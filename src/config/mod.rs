//! Configuration module for the hub test harness.
//!
//! Configuration is JSON (or TOML, by file extension) with environment
//! variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `--config <PATH>` on the command line
//! 2. `HUB_TEST_CONFIG` environment variable (explicit path)
//! 3. `./hub-test.json`, `./hub-test.toml`, then `./test/config.json`
//! 4. `config.json` under the platform config directory (`~/.config/hub-test/` on Linux)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `HUB_TEST_<SECTION>_<KEY>`:
//! - `HUB_TEST_BROKER_HOST=192.168.0.109`
//! - `HUB_TEST_SERIAL_PORT=/dev/ttyUSB0`
//! - `HUB_TEST_TIMING_RESULT_TIMEOUT_MS=60000`
//!
//! `TEST_PORT` and `TEST_BAUD` are accepted as fallbacks for the serial port.
//!
//! # Example
//!
//! ```json
//! {
//!   "broker": { "host": "192.168.0.109", "port": 1883 },
//!   "serial": { "port": "/dev/ttyUSB0", "baud": 115200 },
//!   "topics": { "request": "/test/publish", "reply": "/test/subscribe" }
//! }
//! ```
//!
//! The flat layout used by the old scripts (`BROKER_HOST`, `BROKER_PORT`,
//! `SERIAL_PORT`, `SERIAL_BAUDRATE`, ...) is also accepted.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, parse_json, resolve_config_path, ConfigLoader};
pub use schema::{
    BrokerConfig, Config, LegacyConfig, LogFormat, LoggingConfig, SerialConfig, TimingConfig,
    TopicsConfig,
};
