use coach_core::TurnConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where synthesis and transcription are performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechBackend {
    /// Piper, whisper.cpp and ffmpeg run as local subprocesses.
    Local,
    /// Another speech service reached over HTTP.
    Remote { url: String },
}

/// Paths to the local speech tools and their models.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub whisper_bin: PathBuf,
    pub whisper_model: PathBuf,
    pub piper_bin: PathBuf,
    pub piper_model: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub work_dir: PathBuf,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub scenarios_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub speech_backend: SpeechBackend,
    pub engine: EngineConfig,
    pub match_threshold: f64,
    pub recording_limit: Duration,
    pub playback_timeout: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let scenarios_path = PathBuf::from(var_or("SCENARIOS_PATH", "./scenarios"));
        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let speech_backend = match var_or("SPEECH_BACKEND", "local").to_lowercase().as_str() {
            "local" => SpeechBackend::Local,
            "remote" => {
                let url = std::env::var("SPEECH_REMOTE_URL").map_err(|_| {
                    ConfigError::MissingVar(
                        "SPEECH_REMOTE_URL must be set for 'remote' speech backend".to_string(),
                    )
                })?;
                SpeechBackend::Remote { url }
            }
            other => {
                return Err(ConfigError::InvalidValue(
                    "SPEECH_BACKEND".to_string(),
                    format!("'{}' is not one of 'local' or 'remote'", other),
                ));
            }
        };

        let engine = EngineConfig {
            whisper_bin: PathBuf::from(var_or("WHISPER_BIN", "./whisper.cpp/main")),
            whisper_model: PathBuf::from(var_or(
                "WHISPER_MODEL",
                "./whisper.cpp/models/ggml-base.en.bin",
            )),
            piper_bin: PathBuf::from(var_or("PIPER_BIN", "./piper/piper")),
            piper_model: PathBuf::from(var_or("PIPER_MODEL", "./piper/en_US-amy-medium.onnx")),
            ffmpeg_bin: PathBuf::from(var_or("FFMPEG_BIN", "ffmpeg")),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("coach-audio")),
        };

        let match_threshold = parse_var("MATCH_THRESHOLD", coach_core::session::DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&match_threshold) {
            return Err(ConfigError::InvalidValue(
                "MATCH_THRESHOLD".to_string(),
                format!("{} is outside 0..=1", match_threshold),
            ));
        }
        let recording_limit = Duration::from_secs(parse_var("RECORDING_LIMIT_SECS", 7u64)?);
        let playback_timeout = Duration::from_secs(parse_var("PLAYBACK_TIMEOUT_SECS", 30u64)?);
        if recording_limit.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RECORDING_LIMIT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            log_level,
            scenarios_path,
            static_dir,
            speech_backend,
            engine,
            match_threshold,
            recording_limit,
            playback_timeout,
        })
    }

    /// Turn timings and scoring derived from this configuration.
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            threshold: self.match_threshold,
            max_recording: self.recording_limit,
            ..TurnConfig::default()
        }
    }
}
