//! Hub Test Harness Library
//!
//! Drives the on-device test routines of a home-IoT hub over its serial
//! console, and plays the broker-side half of the MQTT echo test.
//!
//! # Modules
//!
//! - `catalog`: The routines the firmware exports and their trigger bytes
//! - `config`: Configuration loading (JSON, TOML, legacy flat JSON, env overrides)
//! - `device`: Trigger sender and result waiter over the serial console
//! - `error`: Harness-level errors
//! - `logging`: Tracing subscriber setup
//! - `mqtt`: Broker session, reply routing, echo exchange and topic monitor
//! - `port`: Serial port abstraction, mock port and port discovery
//! - `report`: Per-case verdicts and the run summary
//! - `runner`: Runs catalog cases end to end

pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod port;
pub mod report;
pub mod runner;

// Re-export commonly used types for convenience
pub use catalog::{catalog, find, TestCase, TestKind};
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use device::{DeviceLink, ResultCode, ResultWait};
pub use error::{HarnessError, HarnessResult};
pub use mqtt::{EchoExchange, EchoOutcome, MqttSession};
pub use port::{
    DataBits, FlowControl, MockSerialPort, Parity, PortConfiguration, PortError, SerialPortAdapter,
    StopBits, SyncSerialPort,
};
pub use report::{CaseReport, Failure, RunReport};
pub use runner::Runner;
