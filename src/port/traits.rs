//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` trait so the device link can drive either the
//! hub's real UART or a `MockSerialPort` scripted with device output.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Line settings used to open the hub's console UART.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    pub data_bits: DataBits,

    pub flow_control: FlowControl,

    pub parity: Parity,

    pub stop_bits: StopBits,

    /// Per-call read/write timeout. Reads that see no data within this window
    /// return a timeout so callers can check their own deadline.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        // ESP-IDF console defaults: 115200 8N1.
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Implementations are synchronous; async callers move the link onto tokio's
/// blocking pool.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written, which may be short.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read. When no data shows up within
    /// the port timeout this returns an error that `PortError::is_idle` accepts.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Discard unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Write the whole buffer, looping over short writes.
    fn write_all_bytes(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            match self.write_bytes(data)? {
                0 => {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "serial port accepted zero bytes",
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }
}
