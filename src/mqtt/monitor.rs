//! Passive topic monitoring, for watching what the hub publishes.

use super::session::MqttSession;
use crate::HarnessResult;
use chrono::{DateTime, Local};
use rumqttc::Publish;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// One message seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredMessage {
    pub received_at: DateTime<Local>,
    pub topic: String,
    pub qos: u8,
    pub retain: bool,
    /// Payload decoded as UTF-8, lossily.
    pub payload: String,
}

impl From<&Publish> for MonitoredMessage {
    fn from(publish: &Publish) -> Self {
        Self {
            received_at: Local::now(),
            topic: publish.topic.clone(),
            qos: publish.qos as u8,
            retain: publish.retain,
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
        }
    }
}

impl std::fmt::Display for MonitoredMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} qos={} retain={} {}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.qos,
            self.retain,
            self.payload
        )
    }
}

/// Subscribe to `filter` and hand every message to `sink` until `duration`
/// has elapsed. Returns the number of messages seen.
pub async fn monitor<F>(
    session: &mut MqttSession,
    filter: &str,
    duration: Duration,
    mut sink: F,
) -> HarnessResult<usize>
where
    F: FnMut(MonitoredMessage),
{
    // Take the receiver before subscribing so retained messages are not missed.
    let mut messages = session.messages();
    session.subscribe(filter).await?;
    info!(filter, ?duration, "Monitoring");

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut count = 0usize;

    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(publish) => {
                    count += 1;
                    sink(MonitoredMessage::from(&publish));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Monitor fell behind; messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
        }
    }

    if let Err(e) = session.unsubscribe(filter).await {
        warn!(filter, "Failed to unsubscribe monitor: {}", e);
    }
    info!(count, "Monitor finished");
    Ok(count)
}
