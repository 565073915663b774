//! Hand-off of incoming publishes to whoever is waiting for them.

use parking_lot::Mutex;
use rumqttc::Publish;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::oneshot;

/// Routes publishes on a topic to the expectations registered for it.
///
/// Each expectation is fulfilled by at most one message, and each message
/// fulfils at most one expectation (the oldest live one for its topic).
/// Retained messages predate every expectation and are never delivered.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    pending: Mutex<HashMap<String, VecDeque<oneshot::Sender<Publish>>>>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next message on `topic`.
    ///
    /// Register before publishing whatever provokes the reply, so a fast reply
    /// cannot be missed.
    pub fn expect(&self, topic: impl Into<String>) -> Expectation {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .entry(topic.into())
            .or_default()
            .push_back(tx);
        Expectation { rx }
    }

    /// Offer a message to the waiters on its topic.
    ///
    /// Returns true if an expectation took it.
    pub fn deliver(&self, publish: &Publish) -> bool {
        if publish.retain {
            return false;
        }
        let mut pending = self.pending.lock();
        let Some(waiters) = pending.get_mut(&publish.topic) else {
            return false;
        };

        let mut delivered = false;
        while let Some(tx) = waiters.pop_front() {
            // A dropped Expectation leaves a closed sender behind.
            if tx.send(publish.clone()).is_ok() {
                delivered = true;
                break;
            }
        }

        if waiters.is_empty() {
            pending.remove(&publish.topic);
        }
        delivered
    }

    /// Live expectations on `topic`.
    pub fn pending(&self, topic: &str) -> usize {
        self.pending
            .lock()
            .get(topic)
            .map_or(0, |waiters| waiters.iter().filter(|tx| !tx.is_closed()).count())
    }
}

/// Why an expectation produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExpectationError {
    #[error("no message within {0:?}")]
    TimedOut(Duration),
    /// The session shut down while waiting.
    #[error("MQTT session closed while waiting")]
    Closed,
}

/// A pending one-shot wait for the next message on a topic.
#[derive(Debug)]
pub struct Expectation {
    rx: oneshot::Receiver<Publish>,
}

impl Expectation {
    /// Wait up to `timeout` for the message.
    pub async fn wait(self, timeout: Duration) -> Result<Publish, ExpectationError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(publish)) => Ok(publish),
            Ok(Err(_)) => Err(ExpectationError::Closed),
            Err(_) => Err(ExpectationError::TimedOut(timeout)),
        }
    }

    /// Borrowing variant for use inside `tokio::select!` loops.
    pub async fn recv(&mut self) -> Result<Publish, ExpectationError> {
        (&mut self.rx).await.map_err(|_| ExpectationError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;

    fn publish(topic: &str, payload: &str) -> Publish {
        Publish::new(topic, QoS::AtLeastOnce, payload)
    }

    #[tokio::test]
    async fn test_expectation_receives_matching_message() {
        let router = ReplyRouter::new();
        let expectation = router.expect("/test/subscribe");

        assert!(router.deliver(&publish("/test/subscribe", "1f2e3d4c")));

        let msg = expectation.wait(Duration::from_millis(100)).await.unwrap();
        assert_eq!(msg.payload.as_ref(), b"1f2e3d4c");
        assert_eq!(router.pending("/test/subscribe"), 0);
    }

    #[tokio::test]
    async fn test_other_topics_are_not_delivered() {
        let router = ReplyRouter::new();
        let expectation = router.expect("/test/subscribe");

        assert!(!router.deliver(&publish("/test/publish", "1f2e3d4c")));

        let err = expectation.wait(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, ExpectationError::TimedOut(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_each_message_fulfils_one_expectation() {
        let router = ReplyRouter::new();
        let first = router.expect("/r");
        let second = router.expect("/r");

        assert!(router.deliver(&publish("/r", "a")));
        assert!(router.deliver(&publish("/r", "b")));
        assert!(!router.deliver(&publish("/r", "c")));

        let a = first.wait(Duration::from_millis(50)).await.unwrap();
        let b = second.wait(Duration::from_millis(50)).await.unwrap();
        assert_eq!(a.payload.as_ref(), b"a");
        assert_eq!(b.payload.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_dropped_expectation_is_skipped() {
        let router = ReplyRouter::new();
        drop(router.expect("/r"));
        let live = router.expect("/r");
        assert_eq!(router.pending("/r"), 1);

        assert!(router.deliver(&publish("/r", "x")));
        assert_eq!(
            live.wait(Duration::from_millis(50)).await.unwrap().payload.as_ref(),
            b"x"
        );
    }

    #[tokio::test]
    async fn test_late_reply_is_still_received_before_deadline() {
        let router = std::sync::Arc::new(ReplyRouter::new());
        let expectation = router.expect("/r");

        let delivering = router.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            delivering.deliver(&publish("/r", "late"));
        });

        let msg = expectation.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(msg.payload.as_ref(), b"late");
    }

    #[tokio::test]
    async fn test_retained_message_is_not_a_reply() {
        let router = ReplyRouter::new();
        let expectation = router.expect("/test/subscribe");

        let mut stale = publish("/test/subscribe", "deadbeef");
        stale.retain = true;
        assert!(!router.deliver(&stale));
        assert_eq!(router.pending("/test/subscribe"), 1);

        assert!(router.deliver(&publish("/test/subscribe", "1f2e3d4c")));
        let msg = expectation.wait(Duration::from_millis(100)).await.unwrap();
        assert_eq!(msg.payload.as_ref(), b"1f2e3d4c");
    }

    #[tokio::test]
    async fn test_closed_when_router_dropped() {
        let router = ReplyRouter::new();
        let expectation = router.expect("/r");
        drop(router);
        assert_eq!(
            expectation.wait(Duration::from_secs(1)).await.unwrap_err(),
            ExpectationError::Closed
        );
    }
}
