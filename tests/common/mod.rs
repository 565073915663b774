//! Shared test utilities for hub harness tests.
//!
//! - A mock hub console that answers trigger bytes the way the firmware does
//! - A config tuned for fast mock runs
//! - Temp config file helpers
//! - A scripted MQTT broker (`broker`)

#![allow(dead_code)]

pub mod broker;

use hub_test_harness::config::Config;
use hub_test_harness::port::MockSerialPort;
use std::path::PathBuf;
use tempfile::TempDir;

/// Console output for routine `id` finishing with `code`, including the boot
/// noise the firmware prints around it.
pub fn routine_output(id: u8, name: &str, code: i32) -> Vec<u8> {
    format!(
        "{name}\r\nTest ID {id}.\r\nI (1042) HUB_MQTT_UTILS: Wifi initialization success.\r\nTEST RESULT: {code}.\r\n"
    )
    .into_bytes()
}

/// A mock port that answers trigger byte `id` once with `code`.
pub fn mock_hub(port_name: &str, answers: &[(u8, &str, i32)]) -> MockSerialPort {
    let mut mock = MockSerialPort::new(port_name);
    for (id, name, code) in answers {
        mock.react_to(&[*id], &routine_output(*id, name, *code));
    }
    mock
}

/// Defaults with every wait shortened for mock runs.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.device_setup_ms = 0;
    config.timing.result_timeout_ms = 300;
    config.timing.echo_timeout_ms = 300;
    config.timing.echo_republish_ms = 50;
    config
}

/// Write `content` to `name` inside a fresh temp dir. Keep the `TempDir`
/// alive for as long as the file is needed.
pub fn write_config(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write config");
    (dir, path)
}
