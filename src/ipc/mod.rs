//! IPC protocol types for communication with the presentation host.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (agent -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> agent).

pub mod bridge;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Events: agent -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum AgentEvent {
    Starting {},
    Ready {
        microphone: bool,
        speech_output: bool,
    },
    /// A line for the log pane.
    Log { text: String },
    Transcription { text: String },
    ListeningStarted {},
    ListeningStopped {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        reason: Option<String>,
    },
    AiResponse {
        id: String,
        prompt: String,
        text: String,
        failed: bool,
    },
    /// The host may ask the user whether to save response `id`, then answer
    /// with `save_response`.
    SaveOffer { id: String, suggested_name: String },
    CommandResult {
        command: String,
        interactive: bool,
        stdout: String,
        stderr: String,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        #[serde(rename = "timedOut")]
        timed_out: bool,
        summary: String,
    },
    /// A worker is waiting for a yes/no answer (`confirm` command).
    ConfirmRequest {
        id: String,
        title: String,
        message: String,
    },
    FileContent { path: String, content: String },
    Echo { text: String },
    SettingsUpdated { settings: serde_json::Value },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> agent (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum AgentCommand {
    Ping {},
    Stop {},
    StartListening {},
    StopListening {},
    ToggleListening {},
    /// Free-form text; classified like a voice transcript.
    Input {
        text: String,
        #[serde(default)]
        interactive: bool,
    },
    Ask {
        prompt: String,
    },
    /// `cmd` is the shell text; `command` is taken by the tag.
    Run {
        cmd: String,
        #[serde(default)]
        interactive: bool,
    },
    Confirm {
        id: String,
        approved: bool,
    },
    /// Answer to a `save_offer`; no path means the user declined.
    SaveResponse {
        id: String,
        #[serde(default)]
        path: Option<String>,
    },
    ReadFile {
        path: String,
    },
    EditFile {
        path: String,
        instruction: String,
    },
    /// Save a screenshot of the primary monitor. No path means a timestamped
    /// file in the data directory.
    CaptureScreen {
        #[serde(default)]
        path: Option<String>,
    },
    UpdateSettings {
        #[serde(default)]
        settings: serde_json::Value,
    },
}
