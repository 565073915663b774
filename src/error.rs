use crate::config::ConfigError;
use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a harness run.
///
/// A device that reports a non-zero code, or an echo that never arrives, is not
/// an error: those end up as verdicts in the `RunReport`. These variants cover
/// the cases where the harness itself cannot do its job.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Broker {host}:{port} unreachable: {reason}")]
    BrokerUnreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("No SUBACK for '{topic}' within {waited:?}")]
    SubscribeTimeout { topic: String, waited: Duration },

    /// A case needs MQTT but the run was started without a broker session.
    #[error("Test '{0}' needs an MQTT session, but none is connected")]
    MqttUnavailable(&'static str),

    #[error("No serial port configured; set serial.port, HUB_TEST_SERIAL_PORT or --port")]
    NoSerialPort,

    #[error("Unknown test '{0}'; run `hub-test list` for the catalog")]
    UnknownTest(String),

    #[error("Serial worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn broker_unreachable(host: &str, port: u16, reason: impl Into<String>) -> Self {
        Self::BrokerUnreachable {
            host: host.to_string(),
            port,
            reason: reason.into(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
