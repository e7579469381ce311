//! Manages the WebSocket connection lifecycle for a live practice session.

use super::{
    bridge::{PlaybackAcks, WsAudioCapture, WsAudioPlayer},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use coach_core::{ControllerError, ControllerHandle, SpeechServices, TurnController};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Audio frames buffered between the socket and an active recording.
const FRAME_BUFFER: usize = 256;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// What the client told us about itself in `init`.
#[derive(Debug, PartialEq)]
struct ClientCapabilities {
    microphone: bool,
    audio_mime: Option<String>,
}

/// Main handler for an individual WebSocket connection.
///
/// Performs the `init` handshake, then runs the practice session until the
/// client goes away.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());

    // The first message from the client must be an `init` message.
    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            writer.abort();
            return;
        }
    };
    let capabilities = match init {
        Ok(capabilities) => capabilities,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = outbound_tx.send(ServerMessage::Error {
                message: e.to_string(),
            });
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
    };
    info!(?capabilities, "Session initialized");

    let _ = outbound_tx.send(ServerMessage::Initialized {
        session_id,
        scenarios: state.catalog.summaries(),
    });

    if let Err(e) = run_session(state, socket_rx, outbound_tx, capabilities).await {
        error!(error = ?e, "Practice session terminated with error.");
    }
    writer.abort();
    info!("WebSocket connection closed and practice session terminated.");
}

fn parse_init(text: &str) -> Result<ClientCapabilities> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init {
            microphone,
            audio_mime,
        } => Ok(ClientCapabilities {
            microphone,
            audio_mime,
        }),
        _ => Err(anyhow!("First message must be `init`")),
    }
}

/// Serializes queued messages onto the socket until every sender is gone.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!("Failed to write to client WebSocket: {:?}", e);
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// The main event loop for an active WebSocket session.
///
/// Client commands go to the turn controller, binary frames go to the
/// active recording and controller events go back to the client.
async fn run_session(
    state: Arc<AppState>,
    mut socket_rx: SplitStream<WebSocket>,
    outbound_tx: mpsc::UnboundedSender<ServerMessage>,
    capabilities: ClientCapabilities,
) -> Result<()> {
    let (frames_tx, frames_rx) = mpsc::channel::<Bytes>(FRAME_BUFFER);
    let acks = PlaybackAcks::default();
    let turn_config = state.config.turn_config();

    let services = SpeechServices {
        synthesizer: state.synthesizer.clone(),
        player: Arc::new(WsAudioPlayer::new(
            outbound_tx.clone(),
            acks.clone(),
            state.config.playback_timeout,
        )),
        capture: Arc::new(WsAudioCapture::new(
            capabilities.microphone,
            capabilities.audio_mime,
            turn_config.max_recording,
            outbound_tx.clone(),
            frames_rx,
        )),
        transcriber: state.transcriber.clone(),
    };
    let (controller, mut events, controller_task) =
        TurnController::spawn(state.catalog.clone(), services, turn_config);

    let result = loop {
        tokio::select! {
            msg_result = socket_rx.next() => match msg_result {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        if let Err(e) = dispatch(&controller, &acks, msg).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring malformed client message: {}", e);
                        let _ = outbound_tx.send(ServerMessage::Error {
                            message: format!("Invalid message: {e}"),
                        });
                    }
                },
                Some(Ok(Message::Binary(data))) => {
                    if frames_tx.try_send(data).is_err() {
                        warn!("Dropping audio frame, recording is not keeping up.");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection. Shutting down session.");
                    break Ok(());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break Ok(());
                }
            },
            Some(event) = events.recv() => {
                if outbound_tx.send(ServerMessage::Event { event }).is_err() {
                    break Err(anyhow!("client writer stopped"));
                }
            },
        }
    };

    // Dropping the last handle stops the controller and its in-flight work.
    drop(controller);
    if let Err(e) = controller_task.await {
        error!("Turn controller task failed: {:?}", e);
    }
    result
}

/// Routes one client message to the controller.
async fn dispatch(
    controller: &ControllerHandle,
    acks: &PlaybackAcks,
    msg: ClientMessage,
) -> Result<(), ControllerError> {
    debug!(?msg, "Client message");
    match msg {
        ClientMessage::Init { .. } => {
            warn!("Ignoring repeated `init` message.");
            Ok(())
        }
        ClientMessage::SelectScenario { id } => controller.select_scenario(id).await,
        ClientMessage::Back => controller.back().await,
        ClientMessage::Begin => controller.begin().await,
        ClientMessage::ToggleMic => controller.toggle_mic().await,
        ClientMessage::StopRecording => controller.stop_recording().await,
        ClientMessage::Retry => controller.retry().await,
        ClientMessage::Repeat => controller.repeat().await,
        ClientMessage::SubmitText { text } => controller.submit_text(text).await,
        ClientMessage::PlaybackFinished { id, ok } => {
            acks.finish(id, ok);
            Ok(())
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
