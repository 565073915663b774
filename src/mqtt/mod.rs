//! MQTT side of a test run.
//!
//! ```text
//! EventLoop task ──Publish──> ReplyRouter ──oneshot──> Expectation::wait
//!                        └──> broadcast ─────────────> monitor
//! ```

pub mod echo;
pub mod monitor;
pub mod router;
pub mod session;

pub use echo::{generate_token, verify_echo, EchoExchange, EchoOutcome};
pub use monitor::{monitor, MonitoredMessage};
pub use router::{Expectation, ExpectationError, ReplyRouter};
pub use session::MqttSession;
