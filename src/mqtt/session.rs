use super::router::{Expectation, ReplyRouter};
use crate::config::{BrokerConfig, TimingConfig};
use crate::{HarnessError, HarnessResult};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Publish, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the fan-out channel used by monitors.
const BROADCAST_CAPACITY: usize = 64;

/// Back-off after an event loop error before polling (and so reconnecting) again.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Connected,
    /// Last event loop error while not connected.
    Failed(String),
}

/// A connected MQTT client plus the task driving its event loop.
///
/// Incoming publishes go to the `ReplyRouter` first and are also broadcast to
/// any `messages()` subscriber.
pub struct MqttSession {
    client: AsyncClient,
    router: Arc<ReplyRouter>,
    messages_tx: broadcast::Sender<Publish>,
    suback_rx: watch::Receiver<u64>,
    exit_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    subscribe_timeout: Duration,
}

impl MqttSession {
    /// Connect and wait for CONNACK, up to `timing.connect_timeout_ms`.
    pub async fn connect(broker: &BrokerConfig, timing: &TimingConfig) -> HarnessResult<Self> {
        let client_id = broker.client_id();
        let mut options = MqttOptions::new(client_id.clone(), broker.host.clone(), broker.port);
        options.set_keep_alive(broker.keep_alive());
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, 10);

        let router = Arc::new(ReplyRouter::new());
        let (messages_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (state_tx, mut state_rx) = watch::channel(LinkState::Connecting);
        let (suback_tx, suback_rx) = watch::channel(0u64);
        let (exit_tx, mut exit_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = {
            let router = router.clone();
            let messages_tx = messages_tx.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = event_loop.poll() => {
                            match event {
                                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                                    debug!(?ack, "Broker accepted connection");
                                    state_tx.send_replace(LinkState::Connected);
                                }
                                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                                    debug!(pkid = ack.pkid, "Subscription acknowledged");
                                    suback_tx.send_modify(|count| *count += 1);
                                }
                                Ok(Event::Incoming(Incoming::Publish(msg))) => {
                                    debug!(topic = %msg.topic, len = msg.payload.len(), "Received message");
                                    if !router.deliver(&msg) {
                                        debug!(topic = %msg.topic, "No expectation waiting for message");
                                    }
                                    // No receivers is fine; monitors come and go.
                                    let _ = messages_tx.send(msg);
                                }
                                Ok(Event::Incoming(Incoming::Disconnect)) => {
                                    warn!("Broker sent DISCONNECT");
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    error!("MQTT client error: {}", e);
                                    state_tx.send_if_modified(|state| {
                                        if *state == LinkState::Connected {
                                            false
                                        } else {
                                            *state = LinkState::Failed(e.to_string());
                                            true
                                        }
                                    });
                                    tokio::select! {
                                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                                        _ = &mut exit_rx => break,
                                    }
                                }
                            }
                        }
                        _ = &mut exit_rx => {
                            break;
                        }
                    }
                }
                debug!("MQTT event loop stopped");
            })
        };

        // Settles on CONNACK or on the first connection error.
        let _ = tokio::time::timeout(
            timing.connect_timeout(),
            state_rx.wait_for(|state| *state != LinkState::Connecting),
        )
        .await;
        let failure = match &*state_rx.borrow() {
            LinkState::Connected => None,
            LinkState::Failed(reason) => Some(reason.clone()),
            LinkState::Connecting => Some(format!(
                "no CONNACK within {:?}",
                timing.connect_timeout()
            )),
        };

        let mut session = Self {
            client,
            router,
            messages_tx,
            suback_rx,
            exit_tx: Some(exit_tx),
            handle: Some(handle),
            subscribe_timeout: timing.subscribe_timeout(),
        };

        let Some(reason) = failure else {
            info!(host = %broker.host, port = broker.port, %client_id, "Connected to broker");
            return Ok(session);
        };

        session.stop_event_loop().await;
        Err(HarnessError::broker_unreachable(
            &broker.host,
            broker.port,
            reason,
        ))
    }

    /// Subscribe at QoS 1 and wait for the broker's SUBACK.
    pub async fn subscribe(&mut self, topic: &str) -> HarnessResult<()> {
        let seen = *self.suback_rx.borrow_and_update();
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;

        let acked = matches!(
            tokio::time::timeout(
                self.subscribe_timeout,
                self.suback_rx.wait_for(|count| *count > seen),
            )
            .await,
            Ok(Ok(_))
        );

        if !acked {
            return Err(HarnessError::SubscribeTimeout {
                topic: topic.to_string(),
                waited: self.subscribe_timeout,
            });
        }
        debug!(topic, "Subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> HarnessResult<()> {
        self.client.unsubscribe(topic).await?;
        Ok(())
    }

    /// Publish at QoS 1, not retained.
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> HarnessResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Register a one-shot wait for the next message on `topic`.
    pub fn expect(&self, topic: &str) -> Expectation {
        self.router.expect(topic)
    }

    /// Receive a copy of every incoming message from now on.
    pub fn messages(&self) -> broadcast::Receiver<Publish> {
        self.messages_tx.subscribe()
    }

    /// Send DISCONNECT and stop the event loop task.
    pub async fn disconnect(mut self) -> HarnessResult<()> {
        let result = self.client.disconnect().await;
        // Give the event loop a moment to flush the DISCONNECT packet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.stop_event_loop().await;
        result.map_err(HarnessError::from)
    }

    async fn stop_event_loop(&mut self) {
        if let Some(exit_tx) = self.exit_tx.take() {
            let _ = exit_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for MqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSession")
            .field("running", &self.handle.is_some())
            .field("subscribe_timeout", &self.subscribe_timeout)
            .finish()
    }
}
