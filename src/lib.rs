//! Voice Desk: command and voice orchestration core for a desktop assistant.
//!
//! Speech is captured in the background and transcribed, then routed to an
//! AI model, a shell runner (behind a risk gate) or speech output. File
//! edits and screen captures are driven by the host. A
//! presentation host drives it over JSON lines on stdin/stdout.

pub mod ai;
pub mod app;
pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod ipc;
pub mod logging;
pub mod risk;
pub mod runner;
pub mod screen;
pub mod sink;
pub mod speech;
pub mod stt;
pub mod tts;
