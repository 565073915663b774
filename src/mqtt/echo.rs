//! The MQTT echo exchange run alongside the firmware's `TEST MQTT ECHO` routine.
//!
//! The device subscribes to the request topic and republishes the first message
//! it sees on the reply topic. The harness publishes a random token and checks
//! that the reply starts with it.

use super::router::ExpectationError;
use super::session::MqttSession;
use crate::config::{Config, TimingConfig, TopicsConfig};
use crate::HarnessResult;
use rand::RngCore;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Random bytes per token; hex encoding doubles the length.
const TOKEN_BYTES: usize = 4;

/// How an echo exchange ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EchoOutcome {
    Echoed {
        token: String,
        #[serde(rename = "elapsed_ms", with = "crate::report::duration_ms")]
        elapsed: Duration,
        publishes: u32,
    },
    /// A reply arrived but does not start with the token.
    Mismatch {
        sent: String,
        received: String,
    },
    /// Nothing arrived on the reply topic before the deadline.
    TimedOut {
        token: String,
        #[serde(rename = "waited_ms", with = "crate::report::duration_ms")]
        waited: Duration,
        publishes: u32,
    },
}

impl EchoOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Echoed { .. })
    }
}

/// Generate a fresh hex token, e.g. `"9f04c2ab"`.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// True if `payload` echoes `token`. Trailing bytes are allowed.
pub fn verify_echo(token: &str, payload: &[u8]) -> bool {
    payload.starts_with(token.as_bytes())
}

/// Parameters for one echo exchange.
#[derive(Debug, Clone)]
pub struct EchoExchange {
    pub request_topic: String,
    pub reply_topic: String,
    pub timeout: Duration,
    /// Republish interval while waiting; `None` publishes once.
    pub republish: Option<Duration>,
}

impl EchoExchange {
    pub fn new(topics: &TopicsConfig, timing: &TimingConfig) -> Self {
        Self {
            request_topic: topics.request.clone(),
            reply_topic: topics.reply.clone(),
            timeout: timing.echo_timeout(),
            republish: timing.echo_republish(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.topics, &config.timing)
    }

    /// Run the exchange with a fresh token.
    pub async fn run(&self, session: &mut MqttSession) -> HarnessResult<EchoOutcome> {
        self.run_with_token(session, generate_token()).await
    }

    /// Subscribe to the reply topic, publish `token` until it comes back or the
    /// deadline passes, then unsubscribe.
    pub async fn run_with_token(
        &self,
        session: &mut MqttSession,
        token: String,
    ) -> HarnessResult<EchoOutcome> {
        session.subscribe(&self.reply_topic).await?;
        let outcome = self.exchange(session, token).await;
        let unsubscribed = session.unsubscribe(&self.reply_topic).await;

        let outcome = outcome?;
        if let Err(e) = unsubscribed {
            warn!(topic = %self.reply_topic, "Failed to unsubscribe after echo: {}", e);
        }
        Ok(outcome)
    }

    async fn exchange(&self, session: &MqttSession, token: String) -> HarnessResult<EchoOutcome> {
        let mut expectation = session.expect(&self.reply_topic);
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        info!(
            request = %self.request_topic,
            reply = %self.reply_topic,
            %token,
            "Publishing echo token"
        );
        session.publish(&self.request_topic, token.clone()).await?;
        let mut publishes = 1u32;

        let mut republish = self.republish.map(|period| {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                reply = expectation.recv() => {
                    let reply = match reply {
                        Ok(reply) => reply,
                        Err(ExpectationError::Closed) | Err(ExpectationError::TimedOut(_)) => {
                            // The session went away; report it as a silent device.
                            return Ok(EchoOutcome::TimedOut {
                                token,
                                waited: started.elapsed(),
                                publishes,
                            });
                        }
                    };

                    if verify_echo(&token, &reply.payload) {
                        let elapsed = started.elapsed();
                        info!(?elapsed, publishes, "Echo received");
                        return Ok(EchoOutcome::Echoed { token, elapsed, publishes });
                    }

                    let received = String::from_utf8_lossy(&reply.payload).into_owned();
                    warn!(sent = %token, %received, "Echo payload does not match token");
                    return Ok(EchoOutcome::Mismatch { sent: token, received });
                }
                _ = async {
                    match republish.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    debug!(%token, publishes, "Republishing echo token");
                    session.publish(&self.request_topic, token.clone()).await?;
                    publishes += 1;
                }
                _ = &mut deadline => {
                    warn!(%token, timeout = ?self.timeout, "No echo before deadline");
                    return Ok(EchoOutcome::TimedOut {
                        token,
                        waited: started.elapsed(),
                        publishes,
                    });
                }
            }
        }
    }
}
