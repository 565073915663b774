//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` stands in for the hub's console UART. Tests script what the
//! "device" prints, either up front or in reaction to a trigger byte, and then
//! inspect what the harness wrote.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes returned by subsequent reads.
    read_queue: VecDeque<u8>,
    /// Every write, one entry per call.
    write_log: Vec<Vec<u8>>,
    /// Output queued when a write begins with the given bytes.
    reactions: Vec<(Vec<u8>, Vec<u8>)>,
    should_timeout: bool,
    fail_writes: bool,
    timeout: Duration,
    clear_count: usize,
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can keep one handle for inspection after
/// moving another into a `DeviceLink`.
///
/// # Example
/// ```
/// use hub_test_harness::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.react_to(b"\x00", b"TEST WIFI CONNECT DISCONNECT\r\nTEST RESULT: 0.\r\n");
///
/// port.write_bytes(b"\x00").unwrap();
/// assert_eq!(port.written(), b"\x00");
/// assert!(port.available_bytes() > 0);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(100),
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockPortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue raw bytes to be returned by subsequent reads.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state().read_queue.extend(data);
    }

    /// Enqueue one line of device output, terminated with CRLF like the ESP console.
    pub fn enqueue_line(&mut self, line: &str) {
        let mut state = self.state();
        state.read_queue.extend(line.as_bytes());
        state.read_queue.extend(b"\r\n");
    }

    /// Queue `output` for reading once a write starting with `trigger` happens.
    ///
    /// Each reaction fires once.
    pub fn react_to(&mut self, trigger: &[u8], output: &[u8]) {
        self.state()
            .reactions
            .push((trigger.to_vec(), output.to_vec()));
    }

    /// All bytes written so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state().write_log.concat()
    }

    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state().write_log.clone()
    }

    /// Make the next read or write return a timeout.
    pub fn set_should_timeout(&mut self, should_timeout: bool) {
        self.state().should_timeout = should_timeout;
    }

    /// Make every write fail with a broken pipe, like an unplugged adapter.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Number of times `clear_buffers` was called.
    pub fn clear_count(&self) -> usize {
        self.state().clear_count
    }

    pub fn available_bytes(&self) -> usize {
        self.state().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }
        if state.fail_writes {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device disconnected",
            )));
        }

        state.write_log.push(data.to_vec());

        if let Some(pos) = state
            .reactions
            .iter()
            .position(|(trigger, _)| data.starts_with(trigger))
        {
            let (_, output) = state.reactions.remove(pos);
            state.read_queue.extend(output);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state();
        state.read_queue.clear();
        state.clear_count += 1;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
