//! Helpers for tests against a real hub and broker.
//!
//! Configuration comes from the normal loader, so `HUB_TEST_CONFIG`,
//! `HUB_TEST_SERIAL_PORT`/`TEST_PORT` and `HUB_TEST_BROKER_HOST` all apply.

use hub_test_harness::config::{Config, ConfigLoader};
use hub_test_harness::port::available_ports;
use std::time::{Duration, Instant};

/// Load the test config, or `None` (with a note) when no port is configured.
pub fn hardware_config() -> Option<Config> {
    let config = match ConfigLoader::load() {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            println!("Skipping hardware test: {}", e);
            return None;
        }
    };
    if config.serial.resolved_port().is_none() {
        println!("Skipping hardware test: no serial port configured (set TEST_PORT)");
        return None;
    }
    Some(config)
}

/// Print available ports for debugging.
pub fn print_available_ports() {
    match available_ports() {
        Ok(ports) if ports.is_empty() => println!("No serial ports detected on this system"),
        Ok(ports) => {
            println!("Available serial ports ({}):", ports.len());
            for (idx, port) in ports.iter().enumerate() {
                println!("  {}. {}", idx + 1, port);
            }
        }
        Err(e) => println!("Port enumeration failed: {}", e),
    }
}

/// Timing helper for measuring operation duration.
pub struct TimingHelper {
    start: Instant,
    name: String,
}

impl TimingHelper {
    pub fn new(name: &str) -> Self {
        println!("Starting: {}", name);
        TimingHelper {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        println!("Completed: {} in {:?}", self.name, elapsed);
        elapsed
    }
}
