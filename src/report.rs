//! Verdicts and the run summary printed at the end of `hub-test run`.

use crate::catalog::TestCase;
use crate::device::ResultWait;
use crate::mqtt::EchoOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Serialize a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }
}

/// Why a case did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Failure {
    /// The device reported a non-zero code.
    DeviceCode { code: i32 },
    EchoMismatch,
    EchoTimeout,
    ResultTimeout,
    UnknownTest { id: i64 },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceCode { code } => write!(f, "device reported error code {code}"),
            Self::EchoMismatch => write!(f, "echoed payload does not match the token"),
            Self::EchoTimeout => write!(f, "no echo received"),
            Self::ResultTimeout => write!(f, "no TEST RESULT line before the deadline"),
            Self::UnknownTest { id } => write!(f, "device does not know test id {id}"),
        }
    }
}

/// Outcome of one on-device routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub id: u8,
    pub name: &'static str,
    pub device: ResultWait,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<EchoOutcome>,
    pub failures: Vec<Failure>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl CaseReport {
    /// Derive failures from the device and echo outcomes.
    pub fn new(
        case: &TestCase,
        device: ResultWait,
        echo: Option<EchoOutcome>,
        duration: Duration,
    ) -> Self {
        let mut failures = Vec::new();

        match &echo {
            Some(EchoOutcome::Mismatch { .. }) => failures.push(Failure::EchoMismatch),
            Some(EchoOutcome::TimedOut { .. }) => failures.push(Failure::EchoTimeout),
            Some(EchoOutcome::Echoed { .. }) | None => {}
        }

        match &device {
            ResultWait::Reported { code } if code.is_success() => {}
            ResultWait::Reported { code } => failures.push(Failure::DeviceCode { code: code.0 }),
            ResultWait::UnknownTest { id } => failures.push(Failure::UnknownTest { id: *id }),
            ResultWait::TimedOut { .. } => failures.push(Failure::ResultTimeout),
        }

        Self {
            id: case.id,
            name: case.name,
            device,
            echo,
            failures,
            duration,
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for CaseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        write!(
            f,
            "{verdict} [{}] {} ({:.1}s)",
            self.id,
            self.name,
            self.duration.as_secs_f64()
        )?;
        for failure in &self.failures {
            write!(f, "\n       - {failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub port: String,
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            port: port.into(),
            cases: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|case| !case.passed()).count()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for case in &self.cases {
            writeln!(f, "{case}")?;
        }
        write!(
            f,
            "{} passed, {} failed",
            self.cases.len() - self.failed_count(),
            self.failed_count()
        )
    }
}
