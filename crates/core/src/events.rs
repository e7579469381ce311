//! Events emitted by the turn controller for renderers and transports.
//!
//! Subscribers only observe; nothing they do feeds back into the state
//! machine except through the controller handle.

use crate::session::TurnRecord;
use serde::Serialize;
use std::fmt;

/// Turn controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Speaking,
    AwaitingResponse,
    Evaluating,
    RetryReady,
    Completed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Speaking => "speaking",
            TurnState::AwaitingResponse => "awaiting_response",
            TurnState::Evaluating => "evaluating",
            TurnState::RetryReady => "retry_ready",
            TurnState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// How a reply is currently being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    Inactive,
    Recording,
    Transcribing,
    Manual,
}

/// Coarse status used to style the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Idle,
    Speaking,
    Listening,
    Match,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: TurnState,
        to: TurnState,
    },
    Status {
        status: StatusKind,
        label: String,
    },
    ScenarioSelected {
        id: String,
        title: String,
        description: String,
        total: usize,
    },
    /// All progress was cleared.
    SessionReset,
    /// The line the coach is saying (shown even when audio fails).
    PromptShown {
        text: String,
    },
    /// The reply the learner should give, shown for reference.
    ExpectedResponse {
        text: String,
    },
    RecordingStarted {
        max_duration_ms: u64,
    },
    RecordingStopped,
    ManualInputRequested,
    ManualInputClosed,
    Scored {
        transcript: String,
        score: u8,
        accepted: bool,
    },
    TurnLogged {
        record: TurnRecord,
    },
    Progress {
        completed: usize,
        total: usize,
    },
    ScenarioCompleted,
    ClosingsFinished,
    /// An action arrived in a state that does not allow it.
    Rejected {
        action: String,
        reason: String,
    },
}

impl SessionEvent {
    pub(crate) fn status(status: StatusKind, label: impl Into<String>) -> Self {
        SessionEvent::Status {
            status,
            label: label.into(),
        }
    }
}
