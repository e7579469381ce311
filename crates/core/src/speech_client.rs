//! HTTP client for a remote speech service exposing `/api/tts` and `/api/stt`.

use crate::error::SpeechError;
use crate::speech::{AudioClip, AudioSample, MAX_SAMPLE_BYTES, SpeechSynthesizer, Transcriber};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SttResponse {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

/// Synthesizer and transcriber backed by a speech service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSpeechClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSpeechClient {
    /// `base_url` is the service origin, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::InvalidInput("text is required".into()));
        }
        let resp = self
            .client
            .post(self.url("/api/tts"))
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| SpeechError::Service(format!("TTS request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SpeechError::Service(format!("TTS failed: {status}")));
        }

        let mime = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/wav")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SpeechError::Service(format!("TTS response unreadable: {e}")))?;
        if bytes.is_empty() {
            return Err(SpeechError::Service("TTS returned no audio".into()));
        }
        debug!(bytes = bytes.len(), %mime, "Synthesized speech");
        Ok(AudioClip {
            bytes: bytes.to_vec(),
            mime,
        })
    }
}

#[async_trait]
impl Transcriber for HttpSpeechClient {
    async fn transcribe(&self, sample: AudioSample) -> Result<String, SpeechError> {
        if sample.is_empty() {
            return Err(SpeechError::EmptyResult);
        }
        if sample.bytes.len() > MAX_SAMPLE_BYTES {
            return Err(SpeechError::TooLarge {
                size: sample.bytes.len(),
                limit: MAX_SAMPLE_BYTES,
            });
        }

        let file_name = sample.file_name();
        let part = reqwest::multipart::Part::bytes(sample.bytes)
            .file_name(file_name)
            .mime_str(&sample.mime)
            .map_err(|e| SpeechError::InvalidInput(format!("bad MIME type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let resp = self
            .client
            .post(self.url("/api/stt"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Service(format!("STT request failed: {e}")))?;

        let status = resp.status();
        let body: Option<SttResponse> = resp.json().await.ok();
        if !status.is_success() {
            let detail = body
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.to_string());
            return Err(SpeechError::Service(format!("STT failed: {detail}")));
        }

        let transcript = body
            .and_then(|b| b.transcript)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        debug!(chars = transcript.len(), "Transcribed reply");
        Ok(transcript)
    }
}
