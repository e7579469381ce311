//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Besides the JSON messages below, the client sends captured audio as
//! binary frames between `capture_start` and `capture_stop`. An empty binary
//! frame marks the end of a recording.

use coach_core::{ScenarioSummary, SessionEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the session. This must be the first message.
    Init {
        /// Whether the client can record audio at all.
        #[serde(default = "default_true")]
        microphone: bool,
        /// MIME type of the audio the client will upload, e.g. `audio/webm`.
        #[serde(default)]
        audio_mime: Option<String>,
    },
    SelectScenario {
        id: String,
    },
    Back,
    Begin,
    ToggleMic,
    StopRecording,
    Retry,
    Repeat,
    SubmitText {
        text: String,
    },
    /// Reports the end of playback for an `audio` message.
    PlaybackFinished {
        /// Id of the finished clip; acknowledges whatever is playing if absent.
        #[serde(default)]
        id: Option<u64>,
        #[serde(default = "default_true")]
        ok: bool,
    },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session and lists the scenarios to choose from.
    Initialized {
        session_id: Uuid,
        scenarios: Vec<ScenarioSummary>,
    },
    /// A turn controller event, forwarded as-is.
    Event { event: SessionEvent },
    /// A clip to play (base64 encoded). Answer with `playback_finished`.
    Audio { id: u64, data: String, mime: String },
    /// Start streaming microphone audio as binary frames.
    CaptureStart { max_duration_ms: u64 },
    /// Stop recording and flush the remaining audio.
    CaptureStop,
    Error { message: String },
}
