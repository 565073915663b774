//! Serial side of a test run: triggering routines and waiting for their result.

pub mod result;

use crate::config::SerialConfig;
use crate::port::{LinePoll, LineReader, PortError, SerialPortAdapter, SyncSerialPort};
use crate::HarnessError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

pub use result::{classify, parse_result_line, DeviceLine, ResultCode};

/// Pause between polls when the port returns without waiting (non-blocking
/// adapters, mocks).
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// How a result wait ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResultWait {
    /// The device printed `TEST RESULT: <code>`.
    Reported { code: ResultCode },
    /// The device did not recognise the trigger byte.
    UnknownTest { id: i64 },
    /// No result line before the deadline.
    TimedOut {
        #[serde(rename = "waited_ms", with = "crate::report::duration_ms")]
        waited: Duration,
    },
}

impl ResultWait {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reported { code } if code.is_success())
    }
}

/// An open serial connection to the hub's test console.
#[derive(Debug)]
pub struct DeviceLink {
    port: Box<dyn SerialPortAdapter>,
    lines: LineReader,
    terminator: Vec<u8>,
}

impl DeviceLink {
    /// Wrap an already-open port.
    pub fn new(port: Box<dyn SerialPortAdapter>, terminator: Option<&str>) -> Self {
        Self {
            port,
            lines: LineReader::new(),
            terminator: terminator.map(|t| t.as_bytes().to_vec()).unwrap_or_default(),
        }
    }

    /// Open the configured port.
    pub fn open(config: &SerialConfig) -> Result<Self, HarnessError> {
        let name = config.resolved_port().ok_or(HarnessError::NoSerialPort)?;
        let port = SyncSerialPort::open(&name, &config.port_configuration())?;
        info!(port = %name, baud = config.baud, "Opened hub serial console");
        Ok(Self::new(Box::new(port), config.terminator.as_deref()))
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    /// Discard stale console output so an earlier run's result cannot be
    /// mistaken for this one.
    pub fn clear(&mut self) -> Result<(), PortError> {
        self.port.clear_buffers()?;
        self.lines.reset();
        Ok(())
    }

    /// Ask the firmware to start routine `id`.
    pub fn trigger(&mut self, id: u8) -> Result<(), PortError> {
        let mut frame = Vec::with_capacity(1 + self.terminator.len());
        frame.push(id);
        frame.extend_from_slice(&self.terminator);

        debug!(port = self.port.name(), id, "Sending trigger byte");
        self.port.write_all_bytes(&frame)
    }

    /// Read console lines until a result line, an unknown-test line, or `timeout`.
    ///
    /// Undecodable lines are skipped. I/O faults other than an empty poll propagate.
    pub fn wait_for_result(&mut self, timeout: Duration) -> Result<ResultWait, PortError> {
        self.wait_for_result_or_cancel(timeout, &AtomicBool::new(false))
    }

    /// `wait_for_result` that gives up with `PortError::Cancelled` once `cancel`
    /// is set. The flag is checked between polls, so it takes effect within one
    /// port read timeout.
    pub fn wait_for_result_or_cancel(
        &mut self,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<ResultWait, PortError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(waited = ?started.elapsed(), "Result wait cancelled");
                return Err(PortError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Ok(ResultWait::TimedOut {
                    waited: started.elapsed(),
                });
            }

            match self.lines.poll(&mut *self.port)? {
                LinePoll::Line(line) => match classify(&line) {
                    DeviceLine::Result(code) => {
                        debug!(%code, "Device reported result");
                        return Ok(ResultWait::Reported { code });
                    }
                    DeviceLine::UnknownTest(id) => {
                        return Ok(ResultWait::UnknownTest { id });
                    }
                    DeviceLine::Started(id) => debug!(id, "Device started routine"),
                    DeviceLine::Other => trace!(line = %line, "device"),
                },
                LinePoll::Undecodable(raw) => {
                    debug!(len = raw.len(), "Skipping undecodable console line");
                }
                LinePoll::Idle => std::thread::sleep(IDLE_BACKOFF),
            }
        }
    }
}
