//! Playback and capture performed by the browser on the other end of the
//! socket.

use super::protocol::ServerMessage;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use coach_core::{
    AudioCapture, AudioClip, AudioPlayer, AudioSample, SpeechError, StopSignal,
    handoff::{self, Pending, Slot},
    speech::MAX_SAMPLE_BYTES,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long to keep collecting frames after `capture_stop` when the client
/// never sends its end-of-recording marker.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

/// The clip currently waiting for a `playback_finished` acknowledgement.
#[derive(Clone, Default)]
pub struct PlaybackAcks {
    inner: Arc<Mutex<AckState>>,
}

#[derive(Default)]
struct AckState {
    next_id: u64,
    waiting: Option<(u64, Slot<bool>)>,
}

impl PlaybackAcks {
    /// Registers a new clip, abandoning any clip still waiting.
    fn arm(&self) -> (u64, Pending<bool>) {
        let (slot, pending) = handoff::channel();
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = state.next_id;
        state.waiting = Some((id, slot));
        (id, pending)
    }

    /// Resolves the waiting clip. An `id` of `None` matches any clip.
    /// Returns whether a clip was waiting.
    pub fn finish(&self, id: Option<u64>, ok: bool) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let matches = match (&state.waiting, id) {
            (Some((waiting, _)), Some(id)) => *waiting == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            debug!(?id, "Ignoring stale playback acknowledgement");
            return false;
        }
        match state.waiting.take() {
            Some((_, slot)) => slot.fill(ok).is_ok(),
            None => false,
        }
    }
}

/// Sends clips to the client and waits until it reports playback finished.
pub struct WsAudioPlayer {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    acks: PlaybackAcks,
    timeout: Duration,
}

impl WsAudioPlayer {
    pub fn new(
        outbound: mpsc::UnboundedSender<ServerMessage>,
        acks: PlaybackAcks,
        timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            acks,
            timeout,
        }
    }
}

#[async_trait]
impl AudioPlayer for WsAudioPlayer {
    async fn play(&self, clip: AudioClip) -> Result<(), SpeechError> {
        let (id, finished) = self.acks.arm();
        let data = base64::engine::general_purpose::STANDARD.encode(&clip.bytes);
        self.outbound
            .send(ServerMessage::Audio {
                id,
                data,
                mime: clip.mime,
            })
            .map_err(|_| SpeechError::Playback("client disconnected".into()))?;

        match tokio::time::timeout(self.timeout, finished).await {
            Ok(Some(true)) => Ok(()),
            Ok(Some(false)) => Err(SpeechError::Playback("client could not play audio".into())),
            Ok(None) => Err(SpeechError::Playback("playback was interrupted".into())),
            Err(_) => {
                warn!(id, "No playback acknowledgement from client");
                Err(SpeechError::Playback("playback timed out".into()))
            }
        }
    }
}

/// Records by asking the client to stream microphone audio over the socket.
pub struct WsAudioCapture {
    microphone: bool,
    mime: String,
    max_duration: Duration,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    frames: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
}

impl WsAudioCapture {
    pub fn new(
        microphone: bool,
        mime: Option<String>,
        max_duration: Duration,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        frames: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            microphone,
            mime: mime.unwrap_or_else(|| "audio/webm".to_string()),
            max_duration,
            outbound,
            frames: tokio::sync::Mutex::new(frames),
        }
    }
}

/// Tells the client to stop recording, also when the recording is abandoned.
struct StopOnDrop<'a> {
    outbound: &'a mpsc::UnboundedSender<ServerMessage>,
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        let _ = self.outbound.send(ServerMessage::CaptureStop);
    }
}

enum Frame {
    Audio(Bytes),
    End,
    Closed,
}

fn classify(frame: Option<Bytes>) -> Frame {
    match frame {
        Some(bytes) if bytes.is_empty() => Frame::End,
        Some(bytes) => Frame::Audio(bytes),
        None => Frame::Closed,
    }
}

fn append(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), SpeechError> {
    let size = buf.len() + bytes.len();
    if size > MAX_SAMPLE_BYTES {
        warn!(size, "Recording exceeded the upload limit");
        return Err(SpeechError::TooLarge {
            size,
            limit: MAX_SAMPLE_BYTES,
        });
    }
    buf.extend_from_slice(bytes);
    Ok(())
}

#[async_trait]
impl AudioCapture for WsAudioCapture {
    async fn ensure_open(&self) -> Result<(), SpeechError> {
        if self.microphone {
            Ok(())
        } else {
            Err(SpeechError::Unavailable(
                "client reported no microphone".into(),
            ))
        }
    }

    async fn record(&self, mut stop: StopSignal) -> Result<AudioSample, SpeechError> {
        let mut frames = self.frames.lock().await;
        while frames.try_recv().is_ok() {}

        self.outbound
            .send(ServerMessage::CaptureStart {
                max_duration_ms: self.max_duration.as_millis() as u64,
            })
            .map_err(|_| SpeechError::Unavailable("client disconnected".into()))?;
        let guard = StopOnDrop {
            outbound: &self.outbound,
        };

        let mut buf = Vec::new();
        let mut ended = false;
        loop {
            tokio::select! {
                biased;
                frame = frames.recv() => match classify(frame) {
                    Frame::Audio(bytes) => append(&mut buf, &bytes)?,
                    Frame::End => {
                        ended = true;
                        break;
                    }
                    Frame::Closed => {
                        return Err(SpeechError::Unavailable("client disconnected".into()));
                    }
                },
                _ = stop.stopped() => break,
            }
        }
        drop(guard);

        if !ended {
            // The client flushes its last chunk after `capture_stop`.
            let flush = async {
                loop {
                    match classify(frames.recv().await) {
                        Frame::Audio(bytes) => append(&mut buf, &bytes)?,
                        Frame::End | Frame::Closed => return Ok::<(), SpeechError>(()),
                    }
                }
            };
            match tokio::time::timeout(FLUSH_GRACE, flush).await {
                Ok(result) => result?,
                Err(_) => debug!("No end-of-recording marker from client"),
            }
        }

        debug!(bytes = buf.len(), "Recording received");
        Ok(AudioSample::new(buf, self.mime.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_core::speech::stop_channel;

    #[tokio::test]
    async fn test_player_waits_for_acknowledgement() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let acks = PlaybackAcks::default();
        let player = WsAudioPlayer::new(tx, acks.clone(), Duration::from_secs(30));

        let playing = tokio::spawn(async move { player.play(AudioClip::wav(b"RIFF".to_vec())).await });
        let Some(ServerMessage::Audio { id, data, mime }) = rx.recv().await else {
            panic!("expected an audio message");
        };
        assert_eq!(mime, "audio/wav");
        assert_eq!(
            base64::engine::general_purpose::STANDARD.decode(data).unwrap(),
            b"RIFF"
        );

        assert!(!acks.finish(Some(id + 1), true));
        assert!(acks.finish(Some(id), true));
        assert_eq!(playing.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_player_reports_client_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let acks = PlaybackAcks::default();
        let player = WsAudioPlayer::new(tx, acks.clone(), Duration::from_secs(30));

        let playing = tokio::spawn(async move { player.play(AudioClip::wav(vec![1])).await });
        rx.recv().await.unwrap();
        assert!(acks.finish(None, false));
        assert!(matches!(
            playing.await.unwrap(),
            Err(SpeechError::Playback(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_times_out() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let player = WsAudioPlayer::new(tx, PlaybackAcks::default(), Duration::from_secs(30));
        let result = player.play(AudioClip::wav(vec![1])).await;
        assert_eq!(
            result,
            Err(SpeechError::Playback("playback timed out".into()))
        );
    }

    fn ws_capture(microphone: bool) -> (
        WsAudioCapture,
        mpsc::UnboundedReceiver<ServerMessage>,
        mpsc::Sender<Bytes>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let capture = WsAudioCapture::new(
            microphone,
            Some("audio/ogg".into()),
            Duration::from_secs(7),
            out_tx,
            frame_rx,
        );
        (capture, out_rx, frame_tx)
    }

    #[tokio::test]
    async fn test_capture_requires_microphone() {
        let (capture, _out, _frames) = ws_capture(false);
        assert!(matches!(
            capture.ensure_open().await,
            Err(SpeechError::Unavailable(_))
        ));
        let (capture, _out, _frames) = ws_capture(true);
        assert!(capture.ensure_open().await.is_ok());
    }

    #[tokio::test]
    async fn test_capture_collects_frames_until_end_marker() {
        let (capture, mut out, frames) = ws_capture(true);
        let (trigger, signal) = stop_channel();
        let recording = tokio::spawn(async move { capture.record(signal).await });

        assert_eq!(
            out.recv().await,
            Some(ServerMessage::CaptureStart {
                max_duration_ms: 7000
            })
        );
        frames.send(Bytes::from_static(b"yes ")).await.unwrap();
        trigger.stop();
        assert_eq!(out.recv().await, Some(ServerMessage::CaptureStop));
        frames.send(Bytes::from_static(b"please")).await.unwrap();
        frames.send(Bytes::new()).await.unwrap();

        let sample = recording.await.unwrap().unwrap();
        assert_eq!(sample.bytes, b"yes please");
        assert_eq!(sample.mime, "audio/ogg");
    }

    #[tokio::test]
    async fn test_oversized_recording_is_rejected() {
        let (capture, mut out, frames) = ws_capture(true);
        let (_trigger, signal) = stop_channel();
        let recording = tokio::spawn(async move { capture.record(signal).await });

        assert!(matches!(
            out.recv().await,
            Some(ServerMessage::CaptureStart { .. })
        ));
        let chunk = Bytes::from(vec![0u8; 1024 * 1024]);
        let sender = tokio::spawn(async move {
            for _ in 0..12 {
                if frames.send(chunk.clone()).await.is_err() {
                    break;
                }
            }
        });

        let result = recording.await.unwrap();
        assert_eq!(
            result,
            Err(SpeechError::TooLarge {
                size: 11 * 1024 * 1024,
                limit: MAX_SAMPLE_BYTES
            })
        );
        assert_eq!(out.recv().await, Some(ServerMessage::CaptureStop));
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_capture_still_stops_the_client() {
        let (capture, mut out, _frames) = ws_capture(true);
        let (_trigger, signal) = stop_channel();
        let recording = tokio::spawn(async move { capture.record(signal).await });

        assert!(matches!(
            out.recv().await,
            Some(ServerMessage::CaptureStart { .. })
        ));
        recording.abort();
        assert_eq!(out.recv().await, Some(ServerMessage::CaptureStop));
    }

    #[tokio::test]
    async fn test_capture_fails_when_socket_goes_away() {
        let (capture, _out, frames) = ws_capture(true);
        let (_trigger, signal) = stop_channel();
        drop(frames);
        let result = capture.record(signal).await;
        assert!(matches!(result, Err(SpeechError::Unavailable(_))));
    }
}
