//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel; events are written to stdout as JSON lines, one per
//! stdout lock, so lines from different threads never interleave.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{AgentCommand, AgentEvent};

/// Where the consumer loop sends presentation events.
pub trait EventOutput: Send {
    fn emit(&self, event: &AgentEvent);
}

/// JSON lines on the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutEvents;

impl EventOutput for StdoutEvents {
    fn emit(&self, event: &AgentEvent) {
        emit_event(event);
    }
}

/// Emit an `AgentEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &AgentEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Host may have closed the pipe.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Convenience helper for emitting error events.
pub fn emit_error(message: &str) {
    emit_event(&AgentEvent::Error {
        message: message.to_string(),
    });
}

/// Normalize incoming JSON: if it has a `"type"` field but no `"command"`
/// field, rename `"type"` to `"command"` so serde can deserialize it.
fn normalize_command_json(input: &str) -> String {
    if let Ok(mut obj) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(input)
    {
        if !obj.contains_key("command") {
            if let Some(type_val) = obj.remove("type") {
                obj.insert("command".to_string(), type_val);
                if let Ok(json) = serde_json::to_string(&obj) {
                    return json;
                }
            }
        }
    }
    input.to_string()
}

/// Parse one stdin line. `Ok(None)` for blank lines.
pub fn parse_command_line(line: &str) -> Result<Option<AgentCommand>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&normalize_command_json(trimmed)).map(Some)
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `AgentCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (host process gone) or on
/// unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<AgentCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => match parse_command_line(&text) {
                    Ok(Some(cmd)) => {
                        debug!(?cmd, "Received command from host");
                        if tx.send(cmd).is_err() {
                            break; // consumer loop is gone
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(input = %text.trim(), "Invalid JSON command: {}", e);
                        emit_error(&format!("Invalid JSON command: {}", e));
                    }
                },
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break; // stdin closed
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}
