//! Drives catalog cases against a connected hub.

use crate::catalog::{TestCase, TestKind};
use crate::config::Config;
use crate::device::{DeviceLink, ResultWait};
use crate::mqtt::{EchoExchange, MqttSession};
use crate::report::{CaseReport, RunReport};
use crate::{HarnessError, HarnessResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// One test session: a serial link, an optional broker session and the
/// timing/topic settings from the config.
pub struct Runner {
    config: Config,
    link: Arc<Mutex<DeviceLink>>,
    mqtt: Option<MqttSession>,
}

impl Runner {
    pub fn new(config: Config, link: DeviceLink, mqtt: Option<MqttSession>) -> Self {
        Self {
            config,
            link: Arc::new(Mutex::new(link)),
            mqtt,
        }
    }

    /// Wait for the hub to boot after the port was opened.
    pub async fn settle(&self) {
        let delay = self.config.timing.device_setup();
        if !delay.is_zero() {
            info!(?delay, "Waiting for device setup");
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `cases` in order. Harness errors abort the run; test failures do not.
    pub async fn run(&mut self, cases: &[&TestCase]) -> HarnessResult<RunReport> {
        let port = self.link.lock().port_name().to_string();
        let mut report = RunReport::new(port);

        for case in cases {
            let case_report = self
                .run_case(case)
                .instrument(info_span!("case", id = case.id, name = case.name))
                .await?;

            if case_report.passed() {
                info!("{}", case_report);
            } else {
                warn!("{}", case_report);
            }
            report.cases.push(case_report);
        }

        Ok(report)
    }

    /// Trigger one routine, run the echo exchange when it needs one, and collect
    /// the device's verdict.
    pub async fn run_case(&mut self, case: &TestCase) -> HarnessResult<CaseReport> {
        if case.needs_mqtt() && self.mqtt.is_none() {
            return Err(HarnessError::MqttUnavailable(case.name));
        }

        let started = Instant::now();
        {
            let mut link = self.link.lock();
            link.clear()?;
            link.trigger(case.trigger_byte())?;
        }
        info!("Triggered");

        let echo = match (case.kind, self.mqtt.as_mut()) {
            (TestKind::MqttEcho, Some(session)) => {
                let exchange = EchoExchange::from_config(&self.config);
                Some(exchange.run(session).await?)
            }
            _ => None,
        };

        // Collected even after a failed echo so the device finishes its routine
        // before the next trigger.
        let device = self.wait_for_result().await?;

        Ok(CaseReport::new(case, device, echo, started.elapsed()))
    }

    async fn wait_for_result(&self) -> HarnessResult<ResultWait> {
        let link = self.link.clone();
        let timeout = self.config.timing.result_timeout();
        let cancel = Arc::new(AtomicBool::new(false));
        // Dropping this future (e.g. on Ctrl-C) stops the blocking wait too.
        let _cancel_on_drop = CancelOnDrop(cancel.clone());

        let outcome = tokio::task::spawn_blocking(move || {
            let mut link = link.lock();
            link.wait_for_result_or_cancel(timeout, &cancel)
        })
        .await??;
        Ok(outcome)
    }

    /// Close the broker session. The serial port closes when the runner drops.
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        if let Some(session) = self.mqtt.take() {
            session.disconnect().await?;
        }
        Ok(())
    }
}

/// Sets the flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
