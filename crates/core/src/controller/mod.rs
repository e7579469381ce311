//! Turn Controller
//!
//! Drives a practice session one exchange at a time: speak the prompt,
//! acquire a reply (recorded speech, or typed text when recording is not
//! possible), score it, then advance, offer a retry, or finish with the
//! closing lines.
//!
//! The controller runs as a single task that owns the [`Session`]. External
//! actions reach it as commands through a [`ControllerHandle`]; anything slow
//! (synthesis, playback, recording, transcription, waiting for typed input,
//! pacing delays) runs in a spawned task whose outcome comes back over an
//! internal channel. Outcomes are tagged with the session generation, which
//! is bumped on every reset, so results of cancelled work are discarded.

use crate::{
    error::{ControllerError, SpeechError},
    events::{AcquisitionMode, SessionEvent, StatusKind, TurnState},
    handoff::{self, Slot},
    scenario::ScenarioCatalog,
    session::{DEFAULT_THRESHOLD, Session, TurnRecord},
    similarity::{ScoreWeights, Scorer},
    speech::{
        AudioPlayer, AudioSample, MAX_SAMPLE_BYTES, SpeechServices, SpeechSynthesizer,
        StopTrigger, stop_channel,
    },
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{mpsc, oneshot},
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, error, info, warn};


const LISTENING_LABEL: &str = "Tap the mic to answer";

/// Tunable timings and scoring parameters.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Minimum normalized score (0..=1) to accept a reply.
    pub threshold: f64,
    /// Recordings stop on their own after this long.
    pub max_recording: Duration,
    /// Pause between an accepted reply and the next prompt.
    pub advance_delay: Duration,
    /// How long a prompt stays on screen when it could not be spoken.
    pub read_delay: Duration,
    pub weights: ScoreWeights,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_recording: Duration::from_secs(7),
            advance_delay: Duration::from_millis(800),
            read_delay: Duration::from_millis(1500),
            weights: ScoreWeights::default(),
        }
    }
}

/// Read-only view of the session, for rendering and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub scenario_id: Option<String>,
    pub title: Option<String>,
    pub state: TurnState,
    pub acquisition: AcquisitionMode,
    pub exchange_index: usize,
    pub total_exchanges: usize,
    pub pending_prompt: Option<String>,
    pub threshold: f64,
    pub last_transcript: String,
    pub log: Vec<TurnRecord>,
}

#[derive(Debug)]
enum Command {
    SelectScenario(String),
    Back,
    Begin,
    ToggleMic,
    StopRecording,
    Retry,
    Repeat,
    SubmitText(String),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Cloneable handle used to act on a running [`TurnController`].
///
/// The controller stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ControllerError::Closed)
    }

    /// Activates a scenario from the catalog, resetting all progress.
    pub async fn select_scenario(&self, id: impl Into<String>) -> Result<(), ControllerError> {
        self.send(Command::SelectScenario(id.into())).await
    }

    /// Leaves the current scenario, cancelling anything in flight.
    pub async fn back(&self) -> Result<(), ControllerError> {
        self.send(Command::Back).await
    }

    /// Starts, or restarts after completion, the selected scenario.
    pub async fn begin(&self) -> Result<(), ControllerError> {
        self.send(Command::Begin).await
    }

    /// Starts recording a reply, or stops the recording in progress.
    pub async fn toggle_mic(&self) -> Result<(), ControllerError> {
        self.send(Command::ToggleMic).await
    }

    /// Stops the recording in progress. Does nothing if none is running.
    pub async fn stop_recording(&self) -> Result<(), ControllerError> {
        self.send(Command::StopRecording).await
    }

    pub async fn retry(&self) -> Result<(), ControllerError> {
        self.send(Command::Retry).await
    }

    /// Speaks the pending prompt again.
    pub async fn repeat(&self) -> Result<(), ControllerError> {
        self.send(Command::Repeat).await
    }

    /// Supplies typed text for a pending manual input request.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), ControllerError> {
        self.send(Command::SubmitText(text.into())).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| ControllerError::Closed)
    }
}

#[derive(Debug)]
enum Outcome {
    PromptSpoken,
    ClosingsFinished,
    AdvanceDue,
    RecordingStarted { ticket: u64 },
    RecordingLimitReached { ticket: u64 },
    CaptureUnavailable { ticket: u64, error: SpeechError },
    Captured { ticket: u64, result: Result<AudioSample, SpeechError> },
    Transcribed { ticket: u64, result: Result<String, SpeechError> },
    ManualText { ticket: u64, text: Option<String> },
    Faulted { task: &'static str },
}

#[derive(Debug)]
struct Tagged {
    generation: u64,
    outcome: Outcome,
}

/// Sends outcomes back to the controller from inside a task.
#[derive(Clone)]
struct Notifier {
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl Notifier {
    fn send(&self, outcome: Outcome) {
        let _ = self.tx.send(Tagged {
            generation: self.generation,
            outcome,
        });
    }
}

#[derive(Debug)]
enum Acquisition {
    Inactive,
    Recording { ticket: u64, trigger: StopTrigger },
    Transcribing { ticket: u64 },
    /// `slot` is taken once text has been submitted; the acquisition stays
    /// in flight until the submitted text has been evaluated.
    Manual {
        ticket: u64,
        slot: Option<Slot<String>>,
    },
}

impl Acquisition {
    fn mode(&self) -> AcquisitionMode {
        match self {
            Acquisition::Inactive => AcquisitionMode::Inactive,
            Acquisition::Recording { .. } => AcquisitionMode::Recording,
            Acquisition::Transcribing { .. } => AcquisitionMode::Transcribing,
            Acquisition::Manual { .. } => AcquisitionMode::Manual,
        }
    }

    fn ticket(&self) -> Option<u64> {
        match self {
            Acquisition::Inactive => None,
            Acquisition::Recording { ticket, .. }
            | Acquisition::Transcribing { ticket }
            | Acquisition::Manual { ticket, .. } => Some(*ticket),
        }
    }
}

/// Speaks lines on behalf of a task, falling back to text when speech fails.
#[derive(Clone)]
struct Voice {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    events: mpsc::UnboundedSender<SessionEvent>,
    read_delay: Duration,
}

impl Voice {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Shows and speaks `text`. On any speech failure the line stays on
    /// screen for the read delay instead. Returns whether audio was played.
    async fn say(&self, text: String) -> bool {
        self.emit(SessionEvent::PromptShown { text: text.clone() });
        self.emit(SessionEvent::status(StatusKind::Speaking, "Generating audio…"));

        let spoken: Result<(), SpeechError> = async {
            let clip = self.synthesizer.synthesize(&text).await?;
            self.emit(SessionEvent::status(StatusKind::Speaking, "AI speaking"));
            self.player.play(clip).await
        }
        .await;

        match spoken {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "Speech unavailable, showing the line as text");
                self.emit(SessionEvent::status(
                    StatusKind::Speaking,
                    "AI prompt (read text)",
                ));
                tokio::time::sleep(self.read_delay).await;
                false
            }
        }
    }
}

/// The per-session state machine. See the module docs.
pub struct TurnController {
    catalog: Arc<ScenarioCatalog>,
    services: SpeechServices,
    config: TurnConfig,
    scorer: Scorer,
    session: Session,
    state: TurnState,
    acquisition: Acquisition,
    advance_pending: bool,
    generation: u64,
    next_ticket: u64,
    tasks: Vec<AbortHandle>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::Receiver<Command>,
    outcome_tx: mpsc::UnboundedSender<Tagged>,
    outcome_rx: mpsc::UnboundedReceiver<Tagged>,
}

impl TurnController {
    /// Builds a controller together with its handle and event stream.
    /// Nothing happens until [`TurnController::run`] is polled.
    pub fn new(
        catalog: Arc<ScenarioCatalog>,
        services: SpeechServices,
        config: TurnConfig,
    ) -> (Self, ControllerHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, commands) = mpsc::channel(32);
        let (events, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let controller = Self {
            catalog,
            services,
            scorer: Scorer::new(config.weights),
            session: Session::new(config.threshold),
            config,
            state: TurnState::Idle,
            acquisition: Acquisition::Inactive,
            advance_pending: false,
            generation: 0,
            next_ticket: 0,
            tasks: Vec::new(),
            events,
            commands,
            outcome_tx,
            outcome_rx,
        };
        (controller, ControllerHandle { tx: command_tx }, event_rx)
    }

    /// Builds a controller and runs it on a new task.
    pub fn spawn(
        catalog: Arc<ScenarioCatalog>,
        services: SpeechServices,
        config: TurnConfig,
    ) -> (
        ControllerHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
        JoinHandle<()>,
    ) {
        let (controller, handle, events) = Self::new(catalog, services, config);
        let task = tokio::spawn(controller.run());
        (handle, events, task)
    }

    /// Processes commands and task outcomes until every handle is dropped.
    pub async fn run(mut self) {
        info!("Turn controller started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(tagged) = self.outcome_rx.recv() => self.handle_outcome(tagged),
            }
        }
        self.cancel_in_flight();
        info!("Turn controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, state = %self.state, "Command received");
        match command {
            Command::SelectScenario(id) => self.select_scenario(&id),
            Command::Back => self.back(),
            Command::Begin => self.begin(),
            Command::ToggleMic => self.toggle_mic(),
            Command::StopRecording => self.stop_recording(),
            Command::Retry => self.retry(),
            Command::Repeat => self.repeat(),
            Command::SubmitText(text) => self.submit_text(text),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_outcome(&mut self, tagged: Tagged) {
        if tagged.generation != self.generation {
            debug!(outcome = ?tagged.outcome, "Discarding outcome from a cancelled turn");
            return;
        }
        match tagged.outcome {
            Outcome::PromptSpoken => self.on_prompt_spoken(),
            Outcome::ClosingsFinished => {
                info!("Closing lines finished");
                self.emit(SessionEvent::ClosingsFinished);
            }
            Outcome::AdvanceDue => {
                if self.advance_pending && self.state == TurnState::Idle {
                    self.play_current_exchange();
                }
            }
            Outcome::RecordingStarted { ticket } => self.on_recording_started(ticket),
            Outcome::RecordingLimitReached { ticket } => {
                if self.acquisition_ticket_is(ticket) {
                    info!("Recording limit reached");
                    self.stop_recording();
                }
            }
            Outcome::CaptureUnavailable { ticket, error } => {
                if self.acquisition_ticket_is(ticket) {
                    warn!(%error, "Capture unavailable, switching to manual input");
                    self.acquisition = Acquisition::Inactive;
                    self.emit(SessionEvent::status(
                        StatusKind::Retry,
                        "Microphone unavailable",
                    ));
                    self.manual_fallback();
                }
            }
            Outcome::Captured { ticket, result } => self.on_captured(ticket, result),
            Outcome::Transcribed { ticket, result } => self.on_transcribed(ticket, result),
            Outcome::ManualText { ticket, text } => {
                if self.acquisition_ticket_is(ticket) {
                    self.acquisition = Acquisition::Inactive;
                    self.emit(SessionEvent::ManualInputClosed);
                    if let Some(text) = text {
                        self.evaluate(text);
                    }
                }
            }
            Outcome::Faulted { task } => self.on_fault(task),
        }
    }

    // --- Scenario selection and reset ---

    fn select_scenario(&mut self, id: &str) {
        let Some(scenario) = self.catalog.get(id) else {
            self.reject("select_scenario", format!("unknown scenario '{id}'"));
            return;
        };
        info!(scenario = id, title = %scenario.title, "Scenario selected");
        self.reset(Some((id.to_string(), scenario.clone())));
        self.emit(SessionEvent::ScenarioSelected {
            id: id.to_string(),
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            total: scenario.exchanges.len(),
        });
    }

    fn back(&mut self) {
        info!("Leaving scenario");
        self.reset(None);
    }

    fn reset(&mut self, selection: Option<(String, Arc<crate::scenario::Scenario>)>) {
        self.cancel_in_flight();
        self.session.select(selection);
        self.transition(TurnState::Idle);
        self.emit(SessionEvent::SessionReset);
        self.emit(SessionEvent::status(StatusKind::Idle, "Idle"));
        self.emit_progress();
    }

    /// Aborts every running task and invalidates outcomes still in transit.
    fn cancel_in_flight(&mut self) {
        self.generation += 1;
        self.advance_pending = false;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        match std::mem::replace(&mut self.acquisition, Acquisition::Inactive) {
            Acquisition::Recording { trigger, .. } => {
                trigger.stop();
                self.emit(SessionEvent::RecordingStopped);
            }
            Acquisition::Manual { .. } => self.emit(SessionEvent::ManualInputClosed),
            Acquisition::Transcribing { .. } | Acquisition::Inactive => {}
        }
    }

    // --- Prompts and closings ---

    fn begin(&mut self) {
        let Some(scenario) = self.session.scenario() else {
            self.reject("begin", "no scenario selected");
            return;
        };
        let startable = self.state == TurnState::Completed
            || (self.state == TurnState::Idle && !self.advance_pending);
        if !startable {
            self.reject("begin", "the conversation is already running");
            return;
        }
        info!(title = %scenario.title, "Beginning conversation");
        self.cancel_in_flight();
        self.session.restart();
        self.emit(SessionEvent::SessionReset);
        self.emit_progress();
        self.play_current_exchange();
    }

    fn play_current_exchange(&mut self) {
        self.advance_pending = false;
        let Some(exchange) = self.session.current_exchange().cloned() else {
            self.finish();
            return;
        };
        self.emit(SessionEvent::ExpectedResponse {
            text: exchange.response,
        });
        self.speak_prompt(exchange.prompt);
    }

    fn speak_prompt(&mut self, prompt: String) {
        self.transition(TurnState::Speaking);
        let voice = self.voice();
        self.spawn_task("prompt", async move {
            voice.say(prompt).await;
            Outcome::PromptSpoken
        });
    }

    fn on_prompt_spoken(&mut self) {
        if self.state != TurnState::Speaking {
            return;
        }
        if self.session.mark_pending().is_none() {
            warn!("Prompt finished but no exchange remains");
            self.transition(TurnState::Idle);
            return;
        }
        self.transition(TurnState::AwaitingResponse);
        self.emit(SessionEvent::status(StatusKind::Listening, LISTENING_LABEL));
    }

    fn finish(&mut self) {
        self.session.clear_pending();
        self.transition(TurnState::Completed);
        self.emit(SessionEvent::status(StatusKind::Match, "Scenario complete!"));
        self.emit(SessionEvent::ScenarioCompleted);

        let closings = self
            .session
            .scenario()
            .map(|s| s.closings.clone())
            .unwrap_or_default();
        info!(closings = closings.len(), "Scenario complete");
        let voice = self.voice();
        self.spawn_task("closings", async move {
            for line in closings {
                voice.say(line).await;
            }
            Outcome::ClosingsFinished
        });
    }

    fn retry(&mut self) {
        if self.state != TurnState::RetryReady {
            self.reject("retry", "there is no reply to retry");
            return;
        }
        self.transition(TurnState::AwaitingResponse);
        self.emit(SessionEvent::status(StatusKind::Listening, LISTENING_LABEL));
    }

    fn repeat(&mut self) {
        let Some(exchange) = self.session.pending_exchange().cloned() else {
            self.reject("repeat", "no prompt is awaiting a reply");
            return;
        };
        if !matches!(
            self.state,
            TurnState::AwaitingResponse | TurnState::RetryReady
        ) {
            self.reject("repeat", "the prompt cannot be repeated right now");
            return;
        }
        match self.acquisition {
            Acquisition::Recording { .. }
            | Acquisition::Transcribing { .. }
            | Acquisition::Manual { slot: None, .. } => {
                self.reject("repeat", "a reply is being processed");
                return;
            }
            Acquisition::Manual { slot: Some(_), .. } => self.close_manual(),
            Acquisition::Inactive => {}
        }
        debug!(prompt = %exchange.prompt, "Repeating prompt");
        self.speak_prompt(exchange.prompt);
    }

    // --- Reply acquisition ---

    fn toggle_mic(&mut self) {
        if matches!(self.acquisition, Acquisition::Recording { .. }) {
            self.stop_recording();
        } else {
            self.start_recording();
        }
    }

    fn acquisition_blocker(&self) -> Option<&'static str> {
        if self.session.pending_exchange().is_none() {
            Some("no exchange is awaiting a reply")
        } else if !matches!(
            self.state,
            TurnState::AwaitingResponse | TurnState::RetryReady
        ) {
            Some("not ready for a reply")
        } else if !matches!(
            self.acquisition,
            Acquisition::Inactive | Acquisition::Manual { slot: Some(_), .. }
        ) {
            Some("a reply is already being processed")
        } else {
            None
        }
    }

    fn start_recording(&mut self) {
        if let Some(reason) = self.acquisition_blocker() {
            self.reject("start_recording", reason);
            return;
        }
        if matches!(self.acquisition, Acquisition::Manual { .. }) {
            self.close_manual();
        }
        if self.state == TurnState::RetryReady {
            self.transition(TurnState::AwaitingResponse);
        }

        let ticket = self.take_ticket();
        let (trigger, signal) = stop_channel();
        self.acquisition = Acquisition::Recording { ticket, trigger };

        let capture = self.services.capture.clone();
        let notifier = self.notifier();
        self.spawn_task("recording", async move {
            if let Err(error) = capture.ensure_open().await {
                return Outcome::CaptureUnavailable { ticket, error };
            }
            notifier.send(Outcome::RecordingStarted { ticket });
            Outcome::Captured {
                ticket,
                result: capture.record(signal).await,
            }
        });
    }

    fn on_recording_started(&mut self, ticket: u64) {
        if !self.acquisition_ticket_is(ticket) {
            return;
        }
        let limit = self.config.max_recording;
        self.emit(SessionEvent::RecordingStarted {
            max_duration_ms: limit.as_millis() as u64,
        });
        self.emit(SessionEvent::status(StatusKind::Listening, "Recording…"));
        self.spawn_task("recording-limit", async move {
            tokio::time::sleep(limit).await;
            Outcome::RecordingLimitReached { ticket }
        });
    }

    fn stop_recording(&mut self) {
        match &self.acquisition {
            Acquisition::Recording { trigger, .. } => {
                if trigger.stop() {
                    debug!("Recording stop requested");
                    self.emit(SessionEvent::status(StatusKind::Listening, "Processing…"));
                }
            }
            _ => debug!("No recording in progress"),
        }
    }

    fn on_captured(&mut self, ticket: u64, result: Result<AudioSample, SpeechError>) {
        if !self.acquisition_ticket_is(ticket) {
            return;
        }
        self.emit(SessionEvent::RecordingStopped);
        self.acquisition = Acquisition::Inactive;

        let sample = match result {
            Ok(sample) if sample.is_empty() => {
                info!("No audio captured");
                self.emit(SessionEvent::status(StatusKind::Retry, "No audio captured"));
                return;
            }
            Ok(sample) if sample.bytes.len() > MAX_SAMPLE_BYTES => {
                let error = SpeechError::TooLarge {
                    size: sample.bytes.len(),
                    limit: MAX_SAMPLE_BYTES,
                };
                warn!(%error, "Discarding oversized recording");
                self.emit(SessionEvent::status(
                    StatusKind::Retry,
                    "Could not transcribe audio",
                ));
                self.manual_fallback();
                return;
            }
            Ok(sample) => sample,
            Err(error) => {
                warn!(%error, "Recording failed, switching to manual input");
                let label = match error {
                    SpeechError::Unavailable(_) => "Microphone unavailable",
                    SpeechError::TooLarge { .. } => "Could not transcribe audio",
                    _ => "Could not record audio",
                };
                self.emit(SessionEvent::status(StatusKind::Retry, label));
                self.manual_fallback();
                return;
            }
        };

        debug!(bytes = sample.bytes.len(), mime = %sample.mime, "Submitting recording");
        self.acquisition = Acquisition::Transcribing { ticket };
        self.emit(SessionEvent::status(StatusKind::Listening, "Transcribing…"));
        let transcriber = self.services.transcriber.clone();
        self.spawn_task("transcription", async move {
            Outcome::Transcribed {
                ticket,
                result: transcriber.transcribe(sample).await,
            }
        });
    }

    fn on_transcribed(&mut self, ticket: u64, result: Result<String, SpeechError>) {
        if !self.acquisition_ticket_is(ticket) {
            return;
        }
        self.acquisition = Acquisition::Inactive;
        match result.map(|text| text.trim().to_string()) {
            Ok(text) if !text.is_empty() => self.evaluate(text),
            Ok(_) => {
                warn!(error = %SpeechError::EmptyResult, "Empty transcript, switching to manual input");
                self.emit(SessionEvent::status(
                    StatusKind::Retry,
                    "Could not transcribe audio",
                ));
                self.manual_fallback();
            }
            Err(error) => {
                warn!(%error, "Transcription failed, switching to manual input");
                self.emit(SessionEvent::status(
                    StatusKind::Retry,
                    "Could not transcribe audio",
                ));
                self.manual_fallback();
            }
        }
    }

    /// Opens a manual input slot and waits, without a timeout, for text.
    fn manual_fallback(&mut self) {
        if self.session.pending_exchange().is_none() {
            return;
        }
        let ticket = self.take_ticket();
        let (slot, pending) = handoff::channel();
        self.acquisition = Acquisition::Manual {
            ticket,
            slot: Some(slot),
        };
        self.emit(SessionEvent::ManualInputRequested);
        self.spawn_task("manual-input", async move {
            Outcome::ManualText {
                ticket,
                text: pending.await,
            }
        });
    }

    fn close_manual(&mut self) {
        if let Acquisition::Manual { .. } = self.acquisition {
            // Dropping the slot resumes the waiter with `None`.
            self.acquisition = Acquisition::Inactive;
            self.emit(SessionEvent::ManualInputClosed);
        }
    }

    fn submit_text(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            debug!("Ignoring blank manual input");
            return;
        }
        let Acquisition::Manual { slot, .. } = &mut self.acquisition else {
            self.reject("submit_text", "manual input was not requested");
            return;
        };
        match slot.take() {
            Some(slot) => {
                if slot.fill(text).is_err() {
                    warn!("Manual input waiter is gone");
                }
            }
            None => self.reject("submit_text", "a reply was already submitted"),
        }
    }

    // --- Evaluation ---

    fn evaluate(&mut self, transcript: String) {
        let Some(exchange) = self.session.pending_exchange().cloned() else {
            warn!("No exchange awaiting a reply, dropping transcript");
            return;
        };
        self.transition(TurnState::Evaluating);
        self.session.set_last_transcript(transcript.clone());

        let similarity = self.scorer.evaluate(&transcript, &exchange.response);
        let accepted = self.session.accepts(similarity.score);
        info!(
            score = similarity.score,
            jaccard = similarity.jaccard,
            normalized_edit = similarity.normalized_edit,
            accepted,
            "Reply scored"
        );
        self.emit(SessionEvent::Scored {
            transcript: transcript.clone(),
            score: similarity.score,
            accepted,
        });

        if !accepted {
            self.transition(TurnState::RetryReady);
            self.emit(SessionEvent::status(StatusKind::Retry, "Please try again"));
            return;
        }

        self.emit(SessionEvent::status(StatusKind::Match, "Great match!"));
        if let Some(record) = self.session.accept(&transcript, similarity.score) {
            self.emit(SessionEvent::TurnLogged { record });
        }
        self.emit_progress();

        if self.session.is_complete() {
            self.finish();
        } else {
            self.transition(TurnState::Idle);
            self.advance_pending = true;
            let delay = self.config.advance_delay;
            self.spawn_task("advance", async move {
                tokio::time::sleep(delay).await;
                Outcome::AdvanceDue
            });
        }
    }

    /// Restores an actionable state after a task died unexpectedly.
    fn on_fault(&mut self, task: &'static str) {
        error!(task, state = %self.state, "Turn task ended unexpectedly");
        if self.state == TurnState::Completed {
            if task == "closings" {
                self.emit(SessionEvent::ClosingsFinished);
            }
            return;
        }
        if matches!(task, "recording" | "transcription" | "manual-input") {
            self.acquisition = Acquisition::Inactive;
        }
        if self.session.pending_exchange().is_some() {
            self.transition(TurnState::RetryReady);
            self.emit(SessionEvent::status(
                StatusKind::Retry,
                "Something went wrong. Please try again",
            ));
        } else {
            self.advance_pending = false;
            self.transition(TurnState::Idle);
            self.emit(SessionEvent::status(
                StatusKind::Retry,
                "Error starting conversation",
            ));
        }
    }

    // --- Plumbing ---

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            scenario_id: self.session.scenario_id().map(str::to_string),
            title: self.session.scenario().map(|s| s.title.clone()),
            state: self.state,
            acquisition: self.acquisition.mode(),
            exchange_index: self.session.exchange_index(),
            total_exchanges: self.session.total_exchanges(),
            pending_prompt: self.session.pending_exchange().map(|e| e.prompt.clone()),
            threshold: self.session.threshold(),
            last_transcript: self.session.last_transcript().to_string(),
            log: self.session.log().to_vec(),
        }
    }

    fn transition(&mut self, to: TurnState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(%from, %to, "Turn state changed");
        self.state = to;
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn reject(&self, action: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(action, %reason, state = %self.state, "Action rejected");
        self.emit(SessionEvent::Rejected {
            action: action.to_string(),
            reason,
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscriber attached");
        }
    }

    fn emit_progress(&self) {
        self.emit(SessionEvent::Progress {
            completed: self.session.exchange_index(),
            total: self.session.total_exchanges(),
        });
    }

    fn acquisition_ticket_is(&self, ticket: u64) -> bool {
        self.acquisition.ticket() == Some(ticket)
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn voice(&self) -> Voice {
        Voice {
            synthesizer: self.services.synthesizer.clone(),
            player: self.services.player.clone(),
            events: self.events.clone(),
            read_delay: self.config.read_delay,
        }
    }

    fn notifier(&self) -> Notifier {
        Notifier {
            generation: self.generation,
            tx: self.outcome_tx.clone(),
        }
    }

    /// Runs `work` on its own task and routes its outcome back to the loop.
    ///
    /// A panic inside `work` is reported as [`Outcome::Faulted`]; an abort
    /// (from a reset) reports nothing.
    fn spawn_task<F>(&mut self, name: &'static str, work: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let notifier = self.notifier();
        let inner = tokio::spawn(work);
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(inner.abort_handle());
        tokio::spawn(async move {
            match inner.await {
                Ok(outcome) => notifier.send(outcome),
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(task = name, error = %e, "Turn task panicked");
                    notifier.send(Outcome::Faulted { task: name });
                }
            }
        });
    }
}
