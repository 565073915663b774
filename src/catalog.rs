//! The on-device test routines the hub firmware exports.
//!
//! The trigger byte is the index into the firmware's `TEST_CASES` table.

use serde::Serialize;

/// How the harness has to participate in a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Trigger, then wait for the result line.
    SerialOnly,
    /// Trigger, run the MQTT echo exchange, then wait for the result line.
    MqttEcho,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Trigger byte written over serial.
    pub id: u8,
    /// Name the firmware prints when the routine starts.
    pub name: &'static str,
    /// Short selector for the command line.
    pub slug: &'static str,
    pub kind: TestKind,
}

impl TestCase {
    pub fn trigger_byte(&self) -> u8 {
        self.id
    }

    pub fn needs_mqtt(&self) -> bool {
        self.kind == TestKind::MqttEcho
    }
}

impl std::fmt::Display for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.slug)
    }
}

pub const WIFI_CONNECT_DISCONNECT: TestCase = TestCase {
    id: 0,
    name: "TEST WIFI CONNECT DISCONNECT",
    slug: "wifi",
    kind: TestKind::SerialOnly,
};

pub const MQTT_ECHO: TestCase = TestCase {
    id: 1,
    name: "TEST MQTT ECHO",
    slug: "mqtt-echo",
    kind: TestKind::MqttEcho,
};

static CATALOG: [TestCase; 2] = [WIFI_CONNECT_DISCONNECT, MQTT_ECHO];

/// All known routines in trigger-byte order.
pub fn catalog() -> &'static [TestCase] {
    &CATALOG
}

/// Resolve a selector: slug, firmware name (case-insensitive) or numeric id.
pub fn find(selector: &str) -> Option<&'static TestCase> {
    let selector = selector.trim();
    if let Ok(id) = selector.parse::<u8>() {
        return CATALOG.iter().find(|case| case.id == id);
    }
    CATALOG
        .iter()
        .find(|case| case.slug == selector || case.name.eq_ignore_ascii_case(selector))
}
