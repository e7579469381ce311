//! Seams between the turn controller and the speech backends.
//!
//! The controller never talks to a synthesis engine, speaker, microphone or
//! recognizer directly; it only sees these traits. Implementations live at
//! the edges (an HTTP client in this crate, subprocess engines and WebSocket
//! bridges in the API service) and can be swapped freely.

use crate::error::SpeechError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Upper bound on a captured audio sample submitted for transcription.
pub const MAX_SAMPLE_BYTES: usize = 10 * 1024 * 1024;

/// A playable audio payload produced by synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl AudioClip {
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: "audio/wav".to_string(),
        }
    }
}

/// A recorded reply awaiting transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl AudioSample {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Suggested upload file name derived from the MIME type.
    pub fn file_name(&self) -> String {
        let subtype = self
            .mime
            .split(';')
            .next()
            .and_then(|m| m.split('/').nth(1))
            .filter(|s| !s.is_empty())
            .unwrap_or("bin");
        format!("response.{subtype}")
    }
}

/// Turns text into audio.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SpeechError>;
}

/// Plays a clip, resolving once playback has finished.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, clip: AudioClip) -> Result<(), SpeechError>;
}

/// Records the learner's reply.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Acquires the capture device. Called before every recording; an
    /// implementation opens its handle once and reuses it afterwards.
    async fn ensure_open(&self) -> Result<(), SpeechError>;

    /// Records until `stop` fires and returns everything captured so far.
    async fn record(&self, stop: StopSignal) -> Result<AudioSample, SpeechError>;
}

/// Turns a recorded reply into text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, sample: AudioSample) -> Result<String, SpeechError>;
}

/// The full set of speech capabilities a turn controller drives.
#[derive(Clone)]
pub struct SpeechServices {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    pub capture: Arc<dyn AudioCapture>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// Creates a connected stop trigger/signal pair for one recording.
pub fn stop_channel() -> (StopTrigger, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopTrigger(tx), StopSignal(rx))
}

/// Ends a recording. Dropping the trigger ends it as well.
#[derive(Debug)]
pub struct StopTrigger(watch::Sender<bool>);

impl StopTrigger {
    /// Requests the stop. Safe to call any number of times; returns `true`
    /// only for the call that actually stopped the recording.
    pub fn stop(&self) -> bool {
        !self.0.send_replace(true)
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Observed by [`AudioCapture::record`] to know when to finish.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop was requested or the trigger was dropped.
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let (trigger, signal) = stop_channel();
        assert!(!signal.is_stopped());
        assert!(trigger.stop());
        assert!(!trigger.stop());
        assert!(trigger.is_stopped());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_dropping_the_trigger_releases_the_recorder() {
        let (trigger, mut signal) = stop_channel();
        let waiter = tokio::spawn(async move { signal.stopped().await });
        drop(trigger);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let (trigger, signal) = stop_channel();
        let mut waiting = signal.clone();
        let waiter = tokio::spawn(async move { waiting.stopped().await });
        trigger.stop();
        waiter.await.unwrap();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_sample_file_name_follows_mime() {
        assert_eq!(
            AudioSample::new(vec![1], "audio/webm;codecs=opus").file_name(),
            "response.webm"
        );
        assert_eq!(AudioSample::new(vec![1], "audio/wav").file_name(), "response.wav");
        assert_eq!(AudioSample::new(vec![], "garbage").file_name(), "response.bin");
        assert!(AudioSample::new(vec![], "audio/wav").is_empty());
    }
}
