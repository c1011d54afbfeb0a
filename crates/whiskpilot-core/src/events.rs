//! Outbound notifications emitted by a run.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Severity of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Running,
    Success,
    Stopped,
    Warning,
    Error,
}

/// Event emitted by the sequencer or the correlator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutomationEvent {
    StatusUpdate {
        message: String,
        kind: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<String>,
    },
    RunCompleted {
        total_prompts: usize,
    },
    RunFailed {
        error: String,
    },
    DownloadRequested {
        url: String,
        prompt: String,
    },
}

impl AutomationEvent {
    pub fn status(message: impl Into<String>, kind: StatusKind) -> Self {
        Self::StatusUpdate {
            message: message.into(),
            kind,
            progress: None,
        }
    }

    pub fn progress(message: impl Into<String>, progress: impl Into<String>) -> Self {
        Self::StatusUpdate {
            message: message.into(),
            kind: StatusKind::Running,
            progress: Some(progress.into()),
        }
    }

    /// Whether the event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
    }
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AutomationEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AutomationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. Nobody listening is not an error.
    pub fn emit(&self, event: AutomationEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Event dropped, no listener: {:?}", e.0);
        }
    }
}
