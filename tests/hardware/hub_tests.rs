//! Tests requiring a hub running the test firmware and a reachable broker.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0           # or COM15 on Windows
//! export HUB_TEST_BROKER_HOST=192.168.0.109
//!
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::utils::{hardware_config, print_available_ports, TimingHelper};
use hub_test_harness::catalog::{MQTT_ECHO, WIFI_CONNECT_DISCONNECT};
use hub_test_harness::mqtt::{EchoExchange, EchoOutcome, MqttSession};
use hub_test_harness::{DeviceLink, Runner};

#[tokio::test]
#[ignore] // Run with --ignored flag
async fn test_wifi_connect_disconnect_on_hub() {
    let Some(config) = hardware_config() else {
        return;
    };
    print_available_ports();

    let timer = TimingHelper::new("wifi connect/disconnect");
    let link = DeviceLink::open(&config.serial).expect("open hub console");
    let mut runner = Runner::new(config, link, None);
    runner.settle().await;

    let report = runner.run(&[&WIFI_CONNECT_DISCONNECT]).await.unwrap();
    timer.finish();
    println!("{report}");
    assert!(report.passed());
}

#[tokio::test]
#[ignore]
async fn test_mqtt_echo_on_hub() {
    let Some(config) = hardware_config() else {
        return;
    };

    let session = MqttSession::connect(&config.broker, &config.timing)
        .await
        .expect("connect to broker");
    let link = DeviceLink::open(&config.serial).expect("open hub console");
    let mut runner = Runner::new(config, link, Some(session));
    runner.settle().await;

    let report = runner.run(&[&MQTT_ECHO]).await.unwrap();
    runner.shutdown().await.unwrap();
    println!("{report}");
    assert!(report.passed());
}

/// Without a device on the line the exchange must end in a timeout, not hang.
#[tokio::test]
#[ignore]
async fn test_echo_without_device_times_out() {
    let Some(mut config) = hardware_config() else {
        return;
    };
    config.timing.echo_timeout_ms = 1500;
    config.timing.echo_republish_ms = 500;
    config.topics.request = format!("/hub_test/unused/{}", std::process::id());
    config.topics.reply = format!("{}/reply", config.topics.request);

    let mut session = MqttSession::connect(&config.broker, &config.timing)
        .await
        .expect("connect to broker");
    let outcome = EchoExchange::from_config(&config)
        .run(&mut session)
        .await
        .unwrap();
    session.disconnect().await.unwrap();

    match outcome {
        EchoOutcome::TimedOut { publishes, .. } => assert!(publishes >= 2),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
