//! Shared Application State
//!
//! Everything a handler or WebSocket session needs, created once at startup.

use crate::config::Config;
use coach_core::{ScenarioCatalog, SpeechSynthesizer, Transcriber};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ScenarioCatalog>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub config: Arc<Config>,
}
