//! Parsing of the hub's test console output.
//!
//! The firmware's test loop prints, per trigger byte:
//!
//! ```text
//! TEST MQTT ECHO
//! Test ID 1.
//! ... component logs ...
//! TEST RESULT: 0.
//! ```
//!
//! or `Unknown test ID 7.` when the byte selects no routine.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static RESULT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TEST RESULT:\s(-?\d+)").expect("result pattern is valid"));

static UNKNOWN_TEST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Unknown test ID (-?\d+)").expect("unknown-test pattern is valid"));

static TEST_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Test ID (\d+)\.").expect("test-id pattern is valid"));

/// Integer outcome reported by an on-device test routine.
///
/// Only `0` has a fixed meaning. Firmware versions disagree on the rest, so
/// they are kept raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a single console line means to the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    /// `TEST RESULT: <code>`
    Result(ResultCode),
    /// `Unknown test ID <id>`
    UnknownTest(i64),
    /// `Test ID <id>.`, printed when a routine starts.
    Started(u8),
    Other,
}

/// Classify one console line.
///
/// A result line whose code does not fit in an `i32` is not a match.
pub fn classify(line: &str) -> DeviceLine {
    if let Some(caps) = RESULT_PATTERN.captures(line) {
        return match caps[1].parse::<i32>() {
            Ok(code) => DeviceLine::Result(ResultCode(code)),
            Err(_) => {
                tracing::warn!(line, "Ignoring result line with out-of-range code");
                DeviceLine::Other
            }
        };
    }
    if let Some(caps) = UNKNOWN_TEST_PATTERN.captures(line) {
        if let Ok(id) = caps[1].parse::<i64>() {
            return DeviceLine::UnknownTest(id);
        }
    }
    if let Some(caps) = TEST_ID_PATTERN.captures(line) {
        if let Ok(id) = caps[1].parse::<u8>() {
            return DeviceLine::Started(id);
        }
    }
    DeviceLine::Other
}

/// Extract the result code from a line, if it is a result line.
pub fn parse_result_line(line: &str) -> Option<ResultCode> {
    match classify(line) {
        DeviceLine::Result(code) => Some(code),
        _ => None,
    }
}
