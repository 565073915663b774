//! Newline-delimited reading on top of a `SerialPortAdapter`.

use super::error::PortError;
use super::traits::SerialPortAdapter;

const READ_CHUNK: usize = 256;

/// Device lines longer than this are flushed as-is so a missing newline cannot
/// grow the buffer without bound.
const MAX_LINE: usize = 4096;

/// Result of one `LineReader::poll`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePoll {
    /// A complete line, without its `\n` or trailing `\r`.
    Line(String),
    /// A complete line that is not valid UTF-8.
    Undecodable(Vec<u8>),
    /// The port had nothing within its timeout.
    Idle,
}

/// Buffers partial reads and hands out one line at a time.
#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial line, e.g. after the port buffers were cleared.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Return the next buffered line, reading once from `port` if none is complete.
    pub fn poll(&mut self, port: &mut dyn SerialPortAdapter) -> Result<LinePoll, PortError> {
        if let Some(line) = self.take_line() {
            return Ok(line);
        }

        let mut chunk = [0u8; READ_CHUNK];
        match port.read_bytes(&mut chunk) {
            Ok(0) => return Ok(LinePoll::Idle),
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(e) if e.is_idle() => return Ok(LinePoll::Idle),
            Err(e) => return Err(e),
        }

        Ok(self.take_line().unwrap_or(LinePoll::Idle))
    }

    fn take_line(&mut self) -> Option<LinePoll> {
        let end = match memchr::memchr(b'\n', &self.pending) {
            Some(pos) => pos,
            None if self.pending.len() >= MAX_LINE => self.pending.len(),
            None => return None,
        };

        let mut raw: Vec<u8> = self.pending.drain(..end).collect();
        if !self.pending.is_empty() {
            // the newline itself
            self.pending.remove(0);
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        Some(match String::from_utf8(raw) {
            Ok(line) => LinePoll::Line(line),
            Err(e) => LinePoll::Undecodable(e.into_bytes()),
        })
    }
}
