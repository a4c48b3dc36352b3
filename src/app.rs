//! The consumer loop.
//!
//! Owns everything the presentation host sees: host commands come in, sink
//! items are turned into IPC events, pending confirmations and save offers
//! are tracked by id. Workers never touch this state; they only post.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{self, SharedSettings};
use crate::dispatch::{ConfirmRequest, DirectRequest, DispatchInput, Dispatcher};
use crate::error::CoreError;
use crate::ipc::bridge::EventOutput;
use crate::ipc::{AgentCommand, AgentEvent};
use crate::runner::CommandRequest;
use crate::sink::{SinkItem, SinkReceiver};
use crate::speech::SpeechCapture;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered save offers are forgotten after this long.
const SAVE_OFFER_TTL: Duration = Duration::from_secs(30 * 60);

/// Optional native capabilities, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub microphone: bool,
    pub speech_output: bool,
}

impl Capabilities {
    pub fn detect(input_device: Option<&str>) -> Self {
        let caps = Self {
            microphone: crate::audio::input_available(input_device),
            speech_output: crate::tts::playback::output_available(),
        };
        info!(
            microphone = caps.microphone,
            speech_output = caps.speech_output,
            "Capabilities detected"
        );
        caps
    }
}

struct SaveOffer {
    text: String,
    offered_at: Instant,
}

fn suggested_file_name() -> String {
    format!(
        "ai-response-{}.txt",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    )
}

pub struct App {
    dispatcher: Dispatcher,
    capture: Option<SpeechCapture>,
    capture_task: Option<JoinHandle<()>>,
    settings: SharedSettings,
    settings_path: PathBuf,
    pending_confirms: HashMap<String, ConfirmRequest>,
    save_offers: HashMap<String, SaveOffer>,
    output: Box<dyn EventOutput>,
}

impl App {
    /// `capture` is `None` when no microphone was found at startup.
    pub fn new(
        dispatcher: Dispatcher,
        capture: Option<SpeechCapture>,
        settings: SharedSettings,
        settings_path: PathBuf,
        output: Box<dyn EventOutput>,
    ) -> Self {
        Self {
            dispatcher,
            capture,
            capture_task: None,
            settings,
            settings_path,
            pending_confirms: HashMap::new(),
            save_offers: HashMap::new(),
            output,
        }
    }

    fn emit(&self, event: AgentEvent) {
        self.output.emit(&event);
    }

    fn log(&self, text: impl Into<String>) {
        let text = text.into();
        info!(target: "log_pane", "{}", text);
        self.emit(AgentEvent::Log { text });
    }

    fn error(&self, message: impl Into<String>) {
        self.emit(AgentEvent::Error {
            message: message.into(),
        });
    }

    /// Run until a `stop` command arrives or stdin closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<AgentCommand>,
        mut items: SinkReceiver,
    ) {
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                },
                Some(item) = items.recv() => self.handle_item(item),
                _ = housekeeping.tick() => self.housekeeping(),
            }
        }

        self.shutdown().await;
    }

    /// Handle one host command. Returns `false` if the loop should exit.
    pub fn handle_command(&mut self, cmd: AgentCommand) -> bool {
        match cmd {
            AgentCommand::Ping {} => self.emit(AgentEvent::Pong {}),

            AgentCommand::Stop {} => {
                self.emit(AgentEvent::Stopping {});
                return false;
            }

            AgentCommand::StartListening {} => self.start_listening(),
            AgentCommand::StopListening {} => self.stop_listening(),
            AgentCommand::ToggleListening {} => {
                if self.capture.as_ref().is_some_and(SpeechCapture::is_active) {
                    self.stop_listening();
                } else {
                    self.start_listening();
                }
            }

            AgentCommand::Input { text, interactive } => {
                if text.trim().is_empty() {
                    return true;
                }
                self.dispatcher
                    .handle(DispatchInput::Direct(DirectRequest { text, interactive }));
            }

            AgentCommand::Ask { prompt } => {
                if prompt.trim().is_empty() {
                    self.error("Empty prompt");
                } else {
                    self.dispatcher.ask(prompt);
                }
            }

            AgentCommand::Run { cmd, interactive } => {
                if cmd.trim().is_empty() {
                    self.error("Empty command");
                } else {
                    self.dispatcher
                        .run_command(CommandRequest::new(cmd, interactive));
                }
            }

            AgentCommand::Confirm { id, approved } => match self.pending_confirms.remove(&id) {
                Some(request) => {
                    if !request.answer(approved) {
                        self.log("Confirmation expired before it was answered");
                    }
                }
                None => self.error(format!("Unknown or expired confirmation: {id}")),
            },

            AgentCommand::SaveResponse { id, path } => match self.save_offers.remove(&id) {
                Some(offer) => match path.filter(|p| !p.trim().is_empty()) {
                    Some(p) => self.dispatcher.save_response(PathBuf::from(p), offer.text),
                    None => debug!(%id, "Save offer declined"),
                },
                None => self.error(format!("Unknown or expired response: {id}")),
            },

            AgentCommand::ReadFile { path } => self.dispatcher.read_file(PathBuf::from(path)),

            AgentCommand::EditFile { path, instruction } => {
                if instruction.trim().is_empty() {
                    self.error("Empty edit instruction");
                } else {
                    self.dispatcher.edit_file(PathBuf::from(path), instruction);
                }
            }

            AgentCommand::CaptureScreen { path } => {
                let path = crate::screen::screenshot_path(path.as_deref());
                self.log(format!("[Screen] Capturing to {}", path.display()));
                self.dispatcher.capture_screen(path);
            }

            AgentCommand::UpdateSettings { settings } => self.update_settings(&settings),
        }
        true
    }

    fn start_listening(&mut self) {
        let Some(capture) = &self.capture else {
            let err = CoreError::DeviceUnavailable("no microphone available".into());
            warn!("{}", err);
            self.error(err.to_string());
            return;
        };
        match capture.start() {
            Ok(task) => {
                self.capture_task = Some(task);
                self.emit(AgentEvent::ListeningStarted {});
                self.log("Listening started");
            }
            Err(CoreError::AlreadyListening) => self.log("Already listening"),
            Err(e) => self.error(e.to_string()),
        }
    }

    fn stop_listening(&mut self) {
        if self.capture.as_ref().is_some_and(SpeechCapture::stop) {
            self.emit(AgentEvent::ListeningStopped { reason: None });
            self.log("Listening stopped");
        }
    }

    fn update_settings(&mut self, patch: &serde_json::Value) {
        let current = config::snapshot(&self.settings);
        let updated = match config::merge_settings(&current, patch) {
            Ok(s) => s,
            Err(e) => {
                self.error(format!("Invalid settings: {e}"));
                return;
            }
        };
        if let Err(e) = config::save_settings(&self.settings_path, &updated) {
            warn!("{}", e);
            self.error(e.to_string());
        }
        let view = updated.redacted();
        config::replace(&self.settings, updated);
        info!("Settings updated");
        self.emit(AgentEvent::SettingsUpdated { settings: view });
    }

    /// Turn one worker result into host events.
    pub fn handle_item(&mut self, item: SinkItem) {
        debug!(item = item.label(), "Sink item");
        match item {
            SinkItem::Log(text) => self.log(text),

            SinkItem::Utterance(utterance) => {
                if !utterance.is_error_marker() {
                    self.emit(AgentEvent::Transcription {
                        text: utterance.text.clone(),
                    });
                    self.log(format!("[Mic] {}", utterance.text));
                }
                self.dispatcher.handle(DispatchInput::Voice(utterance));
            }

            SinkItem::CaptureStopped { reason } => {
                if let Some(r) = &reason {
                    self.log(r.clone());
                }
                self.emit(AgentEvent::ListeningStopped { reason });
            }

            SinkItem::AiResponse {
                id,
                prompt,
                response,
            } => {
                self.log(format!("[AI Response]\n{}", response.text));
                self.emit(AgentEvent::AiResponse {
                    id,
                    prompt,
                    failed: response.is_error(),
                    text: response.text,
                });
            }

            SinkItem::SaveOffer { id, text } => {
                self.save_offers.insert(
                    id.clone(),
                    SaveOffer {
                        text,
                        offered_at: Instant::now(),
                    },
                );
                self.emit(AgentEvent::SaveOffer {
                    id,
                    suggested_name: suggested_file_name(),
                });
            }

            SinkItem::Execution { request, result } => {
                let summary = result.summary();
                self.log(summary.clone());
                self.emit(AgentEvent::CommandResult {
                    command: request.raw,
                    interactive: result.interactive,
                    stdout: result.stdout,
                    stderr: result.stderr,
                    exit_code: result.exit_code,
                    timed_out: result.timed_out,
                    summary,
                });
            }

            SinkItem::Confirm(request) => {
                self.emit(AgentEvent::ConfirmRequest {
                    id: request.id.clone(),
                    title: request.title.clone(),
                    message: request.message.clone(),
                });
                self.pending_confirms.insert(request.id.clone(), request);
            }

            SinkItem::FileContent { path, content } => self.emit(AgentEvent::FileContent {
                path: path.display().to_string(),
                content,
            }),

            SinkItem::Echo(text) => self.emit(AgentEvent::Echo { text }),
        }
    }

    /// Drop confirmations nobody waits for and stale save offers.
    pub fn housekeeping(&mut self) {
        let before = self.pending_confirms.len() + self.save_offers.len();
        self.pending_confirms.retain(|_, r| !r.is_abandoned());
        self.save_offers
            .retain(|_, o| o.offered_at.elapsed() < SAVE_OFFER_TTL);
        let swept = before - (self.pending_confirms.len() + self.save_offers.len());
        if swept > 0 {
            debug!(swept, "Housekeeping");
        }
    }

    async fn shutdown(&mut self) {
        // Dropping the handles answers "no" to every waiting worker.
        self.pending_confirms.clear();
        if let Some(capture) = &self.capture {
            capture.stop();
            if let Some(task) = self.capture_task.take() {
                let t = capture.timing();
                let bound = t.listen_timeout + t.phrase_time_limit + Duration::from_secs(1);
                if tokio::time::timeout(bound, task).await.is_err() {
                    warn!("Capture loop still busy at shutdown");
                }
            }
        }
        info!("Assistant core shutting down");
    }
}
