//! Blocking yes/no confirmation from worker tasks.
//!
//! A worker posts a [`ConfirmRequest`] carrying a one-shot reply handle and
//! awaits the answer. The consumer resolves it from a `confirm` command. No
//! answer is ever assumed to be yes.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use crate::sink::{ResultSink, SinkItem};

#[derive(Debug)]
pub struct ConfirmRequest {
    pub id: String,
    pub title: String,
    pub message: String,
    reply: oneshot::Sender<bool>,
}

impl ConfirmRequest {
    /// Deliver the answer. Returns false if the asking task is gone.
    pub fn answer(self, approved: bool) -> bool {
        self.reply.send(approved).is_ok()
    }

    /// The asking task stopped waiting (timed out or was dropped).
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    sink: ResultSink,
    timeout: Duration,
}

impl ConfirmationGate {
    pub fn new(sink: ResultSink, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Ask the user and wait. Dropped handles, a closed sink and timeouts
    /// all count as "no".
    pub async fn confirm(&self, title: &str, message: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let id = Uuid::new_v4().to_string();
        let request = ConfirmRequest {
            id: id.clone(),
            title: title.to_string(),
            message: message.to_string(),
            reply,
        };
        if self.sink.post(SinkItem::Confirm(request)).is_err() {
            return false;
        }

        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(approved)) => {
                info!(%id, approved, "Confirmation answered");
                approved
            }
            Ok(Err(_)) => {
                info!(%id, "Confirmation dropped unanswered");
                false
            }
            Err(_) => {
                warn!(%id, timeout_secs = self.timeout.as_secs(), "Confirmation timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink;

    async fn answer_next(rx: &mut sink::SinkReceiver, approved: bool) {
        match rx.recv().await {
            Some(SinkItem::Confirm(req)) => {
                assert_eq!(req.title, "Risky command");
                assert!(req.answer(approved));
            }
            other => panic!("expected confirm request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_yes_and_no() {
        let (sink, mut rx) = sink::channel();
        let gate = ConfirmationGate::new(sink, Duration::from_secs(5));

        let asking = tokio::spawn({
            let gate = gate.clone();
            async move { gate.confirm("Risky command", "rm -rf build").await }
        });
        answer_next(&mut rx, true).await;
        assert!(asking.await.unwrap());

        let asking = tokio::spawn(async move { gate.confirm("Risky command", "reboot").await });
        answer_next(&mut rx, false).await;
        assert!(!asking.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_is_no() {
        let (sink, mut rx) = sink::channel();
        let gate = ConfirmationGate::new(sink, Duration::from_secs(5));
        let asking = tokio::spawn(async move { gate.confirm("t", "m").await });
        drop(rx.recv().await);
        assert!(!asking.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_sink_is_no() {
        let (sink, rx) = sink::channel();
        drop(rx);
        let gate = ConfirmationGate::new(sink, Duration::from_secs(5));
        assert!(!gate.confirm("t", "m").await);
    }

    #[tokio::test]
    async fn test_timeout_is_no() {
        let (sink, mut rx) = sink::channel();
        let gate = ConfirmationGate::new(sink, Duration::from_millis(30));
        assert!(!gate.confirm("t", "m").await);
        match rx.recv().await {
            Some(SinkItem::Confirm(req)) => {
                assert!(req.is_abandoned());
                assert!(!req.answer(true));
            }
            other => panic!("expected confirm request, got {other:?}"),
        }
    }
}
