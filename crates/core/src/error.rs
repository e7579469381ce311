//! Error types shared across the coach core.

use std::path::PathBuf;

/// Failures reported by the speech seams.
///
/// None of these are fatal to a practice session: the turn controller maps
/// each one onto a degraded path (text-only prompt, manual text entry, or a
/// re-offered recording).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    /// The capture capability is missing or permission was denied.
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),
    /// A synthesis or transcription backend failed.
    #[error("speech service failed: {0}")]
    Service(String),
    /// Audio could not be played back.
    #[error("playback failed: {0}")]
    Playback(String),
    /// Nothing was captured or the transcript was empty.
    #[error("no speech captured")]
    EmptyResult,
    #[error("audio sample of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failures while loading scenario content.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read scenarios from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("scenario '{id}' is invalid: {reason}")]
    Invalid { id: String, reason: String },
}

/// Returned by [`crate::controller::ControllerHandle`] once the controller
/// task has stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("turn controller is no longer running")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_error_display() {
        assert_eq!(
            SpeechError::Unavailable("no microphone".into()).to_string(),
            "audio capture unavailable: no microphone"
        );
        assert_eq!(
            SpeechError::TooLarge {
                size: 11,
                limit: 10
            }
            .to_string(),
            "audio sample of 11 bytes exceeds the 10 byte limit"
        );
        assert_eq!(SpeechError::EmptyResult.to_string(), "no speech captured");
    }

    #[test]
    fn test_scenario_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ScenarioError::Parse {
            path: PathBuf::from("scenarios/train.json"),
            source,
        };
        assert!(err.to_string().contains("scenarios/train.json"));
    }
}
