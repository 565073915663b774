//! Port abstraction layer for the hub's serial console.
//!
//! Provides the `SerialPortAdapter` trait with a real and a mock implementation,
//! line splitting for device logs, and port discovery.

pub mod discovery;
pub mod error;
pub mod lines;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use discovery::{available_ports, PortSummary};
pub use error::PortError;
pub use lines::{LinePoll, LineReader};
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::*;
