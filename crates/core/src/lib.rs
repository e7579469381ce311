//! Core of the conversation coach: reply scoring, scenario content, the
//! practice session and the turn controller that drives it.
//!
//! Speech backends are reached only through the traits in [`speech`]; this
//! crate ships an HTTP implementation in [`speech_client`] and the API
//! service provides local and WebSocket-backed ones.

pub mod controller;
pub mod error;
pub mod events;
pub mod handoff;
pub mod scenario;
pub mod session;
pub mod similarity;
pub mod speech;
pub mod speech_client;
pub mod tokenizer;

pub use controller::{ControllerHandle, SessionSnapshot, TurnConfig, TurnController};
pub use error::{ControllerError, ScenarioError, SpeechError};
pub use events::{AcquisitionMode, SessionEvent, StatusKind, TurnState};
pub use scenario::{Exchange, Scenario, ScenarioCatalog, ScenarioSummary};
pub use session::{Session, TurnRecord};
pub use similarity::{ScoreWeights, Scorer, Similarity};
pub use speech::{
    AudioCapture, AudioClip, AudioPlayer, AudioSample, SpeechServices, SpeechSynthesizer,
    StopSignal, StopTrigger, Transcriber,
};
pub use speech_client::HttpSpeechClient;
