//! Voice Desk entry point.
//!
//! Communicates with the presentation host via JSON-line IPC on
//! stdin/stdout; logs go to stderr and the rolling log file.

use std::sync::Arc;

use tracing::{error, info, warn};

use voice_desk::ai::OpenAiChat;
use voice_desk::app::{App, Capabilities};
use voice_desk::audio::Microphone;
use voice_desk::config::{self, paths};
use voice_desk::dispatch::{Backends, Dispatcher};
use voice_desk::files::LocalFiles;
use voice_desk::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader, StdoutEvents};
use voice_desk::ipc::AgentEvent;
use voice_desk::logging;
use voice_desk::runner::CommandRunner;
use voice_desk::screen::PrimaryMonitor;
use voice_desk::sink;
use voice_desk::speech::{CaptureTiming, SpeechCapture};
use voice_desk::stt::OpenAiWhisper;
use voice_desk::tts::cloud::OpenAiTts;
use voice_desk::tts::{Silent, SpeechOutput, Speaker};

#[tokio::main]
async fn main() {
    logging::init(&paths::get_log_dir());

    // Emit starting event immediately so the host knows we're alive.
    emit_event(&AgentEvent::Starting {});

    let settings_path = config::settings_path();
    let loaded = config::load_settings(&settings_path);
    info!(path = %settings_path.display(), "Configuration loaded");

    let api_key = match config::resolve_api_key(&loaded, std::env::var(config::API_KEY_ENV).ok()) {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            emit_error(&e.to_string());
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let caps = Capabilities::detect(loaded.input_device.as_deref());

    let settings = config::shared(loaded.clone());
    let (result_sink, sink_rx) = sink::channel();

    let mut chat = OpenAiChat::new(&api_key, Some(loaded.ai_model.as_str()));
    if let Some(endpoint) = loaded.ai_endpoint.as_deref() {
        chat = chat.with_endpoint(endpoint);
    }

    let speaker = if caps.speech_output {
        Speaker::spawn(OpenAiTts::new(&api_key), Arc::clone(&settings))
            .await
            .map_err(|e| warn!(error = %e, "Speech output unavailable"))
            .ok()
    } else {
        None
    };
    let speaking = speaker.is_some() && loaded.speech_output;
    let speech: Arc<dyn SpeechOutput> = match speaker {
        Some(s) => Arc::new(s),
        None => Arc::new(Silent),
    };

    let backends = Backends {
        ai: Arc::new(chat),
        runner: Arc::new(CommandRunner::new(loaded.command_timeout())),
        speech,
        files: Arc::new(LocalFiles),
        screen: Arc::new(PrimaryMonitor),
    };
    let dispatcher = Dispatcher::new(backends, result_sink.clone(), Arc::clone(&settings));

    let capture = caps.microphone.then(|| {
        SpeechCapture::new(
            Box::new(Microphone::new(loaded.input_device.clone())),
            Arc::new(OpenAiWhisper::new(&api_key)),
            result_sink.clone(),
            CaptureTiming::default(),
        )
    });
    drop(result_sink);

    let cmd_rx = spawn_stdin_reader();

    emit_event(&AgentEvent::Ready {
        microphone: caps.microphone,
        speech_output: speaking,
    });
    info!("Assistant core ready");

    App::new(
        dispatcher,
        capture,
        settings,
        settings_path,
        Box::new(StdoutEvents),
    )
    .run(cmd_rx, sink_rx)
    .await;
}
