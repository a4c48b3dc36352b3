//! Result sink: the single serialization point between workers and the
//! consumer loop.
//!
//! Any number of tasks hold a cloned [`ResultSink`] and `post` into it; only
//! the consumer loop owns the [`SinkReceiver`]. The buffer is unbounded, so a
//! post never waits on the consumer. Once the receiver is dropped, `post`
//! returns [`CoreError::SinkClosed`] and logs at error level instead of
//! discarding the item quietly.
//!
//! Ordering: items from one producer arrive in the order they were posted.
//! Across producers only exactly-once delivery is promised.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::error;

use crate::ai::AiResponse;
use crate::dispatch::gate::ConfirmRequest;
use crate::error::CoreError;
use crate::runner::{CommandRequest, ExecutionResult};
use crate::speech::Utterance;

/// Everything a worker can hand to the consumer.
#[derive(Debug)]
pub enum SinkItem {
    /// A line for the presentation log pane.
    Log(String),
    /// Speech transcript (or transcription-error marker) to be dispatched.
    Utterance(Utterance),
    /// The capture loop exited on its own (calibration failure, closed device).
    CaptureStopped { reason: Option<String> },
    AiResponse {
        id: String,
        prompt: String,
        response: AiResponse,
    },
    /// The consumer may ask the user whether to save this response.
    SaveOffer { id: String, text: String },
    Execution {
        request: CommandRequest,
        result: ExecutionResult,
    },
    /// A worker is suspended until the user answers.
    Confirm(ConfirmRequest),
    FileContent { path: PathBuf, content: String },
    /// Direct input that matched no intent.
    Echo(String),
}

impl SinkItem {
    /// Short name for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Utterance(_) => "utterance",
            Self::CaptureStopped { .. } => "capture_stopped",
            Self::AiResponse { .. } => "ai_response",
            Self::SaveOffer { .. } => "save_offer",
            Self::Execution { .. } => "execution",
            Self::Confirm(_) => "confirm",
            Self::FileContent { .. } => "file_content",
            Self::Echo(_) => "echo",
        }
    }
}

/// Producer handle. Cheap to clone; one per worker.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::UnboundedSender<SinkItem>,
}

/// Consumer handle. Exactly one exists, owned by the consumer loop.
#[derive(Debug)]
pub struct SinkReceiver {
    rx: mpsc::UnboundedReceiver<SinkItem>,
}

/// Create a connected sink/receiver pair.
pub fn channel() -> (ResultSink, SinkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSink { tx }, SinkReceiver { rx })
}

impl ResultSink {
    /// Enqueue an item for the consumer. Never blocks.
    pub fn post(&self, item: SinkItem) -> Result<(), CoreError> {
        self.tx.send(item).map_err(|e| {
            error!(item = e.0.label(), "Result sink closed, item not delivered");
            CoreError::SinkClosed
        })
    }

    /// Post a log line. A closed sink is already reported by `post`.
    pub fn log(&self, text: impl Into<String>) {
        let _ = self.post(SinkItem::Log(text.into()));
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SinkReceiver {
    /// Wait for the next item. `None` once every producer is dropped.
    pub async fn recv(&mut self) -> Option<SinkItem> {
        self.rx.recv().await
    }

    /// Take everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<SinkItem> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}
