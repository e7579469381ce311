//! Local Speech Engine
//!
//! Synthesis and transcription backed by command-line tools: Piper turns
//! text into a WAV file, ffmpeg normalizes uploads to 16 kHz mono WAV, and
//! whisper.cpp transcribes that into a text file. Every request works in its
//! own temporary directory under the configured work dir, removed when the
//! request finishes.

pub mod command;

use crate::config::EngineConfig;
use async_trait::async_trait;
use coach_core::{
    AudioClip, AudioSample, SpeechError, SpeechSynthesizer, Transcriber,
    speech::MAX_SAMPLE_BYTES,
};
use command::run_tool;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const TOOL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct LocalSpeechEngine {
    config: EngineConfig,
    timeout: Duration,
}

impl LocalSpeechEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            timeout: TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn scratch_dir(&self, prefix: &str) -> Result<TempDir, SpeechError> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| SpeechError::Service(format!("work dir unavailable: {e}")))?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.config.work_dir)
            .map_err(|e| SpeechError::Service(format!("could not create scratch dir: {e}")))
    }

    /// Piper picks up `<model>.json` when it sits next to the model.
    fn piper_model_config(&self) -> Option<PathBuf> {
        let mut name = self.config.piper_model.clone().into_os_string();
        name.push(".json");
        let path = PathBuf::from(name);
        path.exists().then_some(path)
    }
}

fn os(part: impl AsRef<OsStr>) -> OsString {
    part.as_ref().to_os_string()
}

async fn read_output(path: &Path, what: &str) -> Result<Vec<u8>, SpeechError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| SpeechError::Service(format!("{what} produced no output: {e}")))
}

#[async_trait]
impl SpeechSynthesizer for LocalSpeechEngine {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::InvalidInput("text is required".into()));
        }

        let dir = self.scratch_dir("tts-").await?;
        let out = dir.path().join("out.wav");
        let mut piper_args = vec![os("-m"), os(&self.config.piper_model), os("-f"), os(&out)];
        if let Some(model_config) = self.piper_model_config() {
            piper_args.push("-c".into());
            piper_args.push(model_config.into_os_string());
        }

        run_tool(
            &self.config.piper_bin,
            piper_args,
            Some(text.as_bytes()),
            self.timeout,
        )
        .await?;
        let bytes = read_output(&out, "piper").await?;
        debug!(bytes = bytes.len(), "Synthesized speech locally");
        Ok(AudioClip::wav(bytes))
    }
}

#[async_trait]
impl Transcriber for LocalSpeechEngine {
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

        let dir = self.scratch_dir("stt-").await?;
        let input = dir.path().join(sample.file_name());
        let wav = dir.path().join("input.wav");
        let base = dir.path().join("transcript");
        tokio::fs::write(&input, &sample.bytes)
            .await
            .map_err(|e| SpeechError::Service(format!("could not store upload: {e}")))?;

        run_tool(
            &self.config.ffmpeg_bin,
            [
                os("-y"),
                os("-i"),
                os(&input),
                os("-ar"),
                os("16000"),
                os("-ac"),
                os("1"),
                os(&wav),
            ],
            None,
            self.timeout,
        )
        .await?;

        run_tool(
            &self.config.whisper_bin,
            [
                os("-m"),
                os(&self.config.whisper_model),
                os("-f"),
                os(&wav),
                os("-otxt"),
                os("-of"),
                os(&base),
                os("-pp"),
                os("-nt"),
            ],
            None,
            self.timeout,
        )
        .await?;

        let mut txt = base.into_os_string();
        txt.push(".txt");
        let raw = read_output(Path::new(&txt), "whisper").await?;
        let transcript = String::from_utf8_lossy(&raw).trim().to_string();
        info!(chars = transcript.len(), "Transcribed upload locally");
        Ok(transcript)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Fake tools: piper writes its stdin to the `-f` file, ffmpeg copies its
    /// input, whisper copies the wav into `<base>.txt`.
    fn engine(tools: &Path, work: &Path) -> LocalSpeechEngine {
        LocalSpeechEngine::new(EngineConfig {
            piper_bin: script(
                tools,
                "piper",
                r#"while [ $# -gt 0 ]; do [ "$1" = "-f" ] && out="$2"; shift; done; cat > "$out""#,
            ),
            piper_model: tools.join("voice.onnx"),
            ffmpeg_bin: script(tools, "ffmpeg", r#"cp "$3" "$8""#),
            whisper_bin: script(tools, "whisper", r#"cp "$4" "$7.txt""#),
            whisper_model: tools.join("ggml-base.en.bin"),
            work_dir: work.to_path_buf(),
        })
        .with_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    #[serial]
    async fn test_synthesize_runs_piper_with_text_on_stdin() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let engine = engine(tools.path(), work.path());

        let clip = engine.synthesize("  Excuse me, Madam. ").await.unwrap();
        assert_eq!(clip.mime, "audio/wav");
        assert_eq!(clip.bytes, b"Excuse me, Madam.");
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_transcribe_converts_then_reads_trimmed_text() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let engine = engine(tools.path(), work.path());

        let text = engine
            .transcribe(AudioSample::new(b"  yes please\n".to_vec(), "audio/webm"))
            .await
            .unwrap();
        assert_eq!(text, "yes please");
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_piper_model_config_is_passed_when_present() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let engine = engine(tools.path(), work.path());
        assert!(engine.piper_model_config().is_none());

        std::fs::write(tools.path().join("voice.onnx.json"), "{}").unwrap();
        assert_eq!(
            engine.piper_model_config(),
            Some(tools.path().join("voice.onnx.json"))
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_failures_surface_as_speech_errors() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let mut engine = engine(tools.path(), work.path());

        assert!(matches!(
            engine.synthesize("   ").await,
            Err(SpeechError::InvalidInput(_))
        ));
        assert_eq!(
            engine
                .transcribe(AudioSample::new(Vec::new(), "audio/webm"))
                .await,
            Err(SpeechError::EmptyResult)
        );

        engine.config.whisper_bin = script(tools.path(), "broken", "exit 1");
        let err = engine
            .transcribe(AudioSample::new(b"audio".to_vec(), "audio/webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Service(_)));
    }
}
