//! Routes utterances and direct requests to the AI, the shell runner or
//! speech output, and runs host requests for file edits and screen captures.
//!
//! Every entry point spawns and returns at once; results come back through
//! the [`ResultSink`]. Risky commands are held at the [`ConfirmationGate`]
//! until the user answers.

pub mod gate;
pub mod intent;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{AiQuery, CompletionService};
use crate::config::{self, SharedSettings};
use crate::files::{self, PersistenceSink};
use crate::risk::{self, RiskVerdict};
use crate::runner::{CommandExecutor, CommandRequest};
use crate::screen::{self, ScreenCapture};
use crate::sink::{ResultSink, SinkItem};
use crate::speech::Utterance;
use crate::tts::SpeechOutput;

pub use gate::{ConfirmRequest, ConfirmationGate};
pub use intent::{classify_intent, Intent};

/// Output budget for whole-file rewrites.
pub const EDIT_MAX_TOKENS: u32 = 2000;

/// Text typed or sent by the host rather than spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectRequest {
    pub text: String,
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchInput {
    Voice(Utterance),
    Direct(DirectRequest),
}

/// External services the dispatcher drives.
#[derive(Clone)]
pub struct Backends {
    pub ai: Arc<dyn CompletionService>,
    pub runner: Arc<dyn CommandExecutor>,
    pub speech: Arc<dyn SpeechOutput>,
    pub files: Arc<dyn PersistenceSink>,
    pub screen: Arc<dyn ScreenCapture>,
}

#[derive(Clone)]
pub struct Dispatcher {
    backends: Backends,
    sink: ResultSink,
    settings: SharedSettings,
}

fn edit_prompt(content: &str, instruction: &str) -> String {
    format!(
        "Original file content:\n```\n{content}\n```\n\nEdit request: {instruction}\nReturn full updated file."
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl Dispatcher {
    pub fn new(backends: Backends, sink: ResultSink, settings: SharedSettings) -> Self {
        Self {
            backends,
            sink,
            settings,
        }
    }

    pub fn handle(&self, input: DispatchInput) {
        match input {
            DispatchInput::Voice(utterance) => self.handle_voice(utterance),
            DispatchInput::Direct(request) => self.handle_direct(request),
        }
    }

    fn handle_voice(&self, utterance: Utterance) {
        if utterance.is_error_marker() {
            warn!(marker = %utterance.text, "Transcription failure reported");
            self.sink.log(utterance.text);
            return;
        }
        match classify_intent(&utterance.text) {
            Intent::Ask { prompt } => self.ask(prompt),
            Intent::Run { command } => self.run_command(CommandRequest::new(command, false)),
            Intent::Fallback => self.speak(&utterance.text),
        }
    }

    fn handle_direct(&self, request: DirectRequest) {
        match classify_intent(&request.text) {
            Intent::Ask { prompt } => self.ask(prompt),
            Intent::Run { command } => {
                self.run_command(CommandRequest::new(command, request.interactive))
            }
            Intent::Fallback => {
                let _ = self.sink.post(SinkItem::Echo(request.text));
            }
        }
    }

    /// Best-effort speech; failures are logged and reported, never raised.
    fn speak(&self, text: &str) {
        if !config::snapshot(&self.settings).speech_output {
            return;
        }
        if let Err(e) = self.backends.speech.speak(text) {
            warn!(error = %e, "Speech output failed");
            self.sink.log(format!("[TTS error: {e}]"));
        }
    }

    pub fn ask(&self, prompt: String) {
        let this = self.clone();
        tokio::spawn(async move { this.ask_task(prompt).await });
    }

    async fn ask_task(&self, prompt: String) {
        let settings = config::snapshot(&self.settings);
        self.sink.log(format!("[AI] Prompt: {prompt}"));
        info!(prompt_chars = prompt.len(), "AI query");

        let query = AiQuery::new(prompt.clone()).with_max_tokens(settings.ai_max_tokens);
        let response = self.backends.ai.complete(query).await;

        let id = Uuid::new_v4().to_string();
        let text = response.text.clone();
        if self
            .sink
            .post(SinkItem::AiResponse {
                id: id.clone(),
                prompt,
                response,
            })
            .is_err()
        {
            return;
        }

        // Independent outcomes: none of these may prevent the others.
        self.speak(&preview(&text, settings.speech_preview_chars));

        if let Some(target) = settings.auto_write_target() {
            self.write_in_background(target, text.clone());
        }

        let _ = self.sink.post(SinkItem::SaveOffer { id, text });
    }

    fn write_in_background(&self, path: PathBuf, content: String) {
        let files = Arc::clone(&self.backends.files);
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let status = match tokio::task::spawn_blocking(move || files.write(&path, &content)).await
            {
                Ok(status) => status,
                Err(e) => format!("[Error writing file: {e}]"),
            };
            sink.log(status);
        });
    }

    pub fn run_command(&self, request: CommandRequest) {
        let this = self.clone();
        tokio::spawn(async move { this.run_task(request).await });
    }

    async fn run_task(&self, request: CommandRequest) {
        if let RiskVerdict::Risky { reason } = risk::classify(&request.raw) {
            let gate = self.gate();
            let message = format!(
                "Command appears risky ({reason}):\n{}\nRun anyway?",
                request.raw
            );
            if !gate.confirm("Risky command", &message).await {
                info!(command = %request.raw, reason, "Risky command aborted");
                self.sink.log("[Run] Command aborted by user");
                return;
            }
        }

        self.sink.log(format!("[Run] {}", request.raw));
        let result = self.backends.runner.run(&request).await;
        let _ = self.sink.post(SinkItem::Execution { request, result });
    }

    fn gate(&self) -> ConfirmationGate {
        let timeout = config::snapshot(&self.settings).confirm_timeout();
        ConfirmationGate::new(self.sink.clone(), timeout)
    }

    pub fn read_file(&self, path: PathBuf) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let read_path = path.clone();
            let content = match tokio::task::spawn_blocking(move || files::read_text(&read_path)).await
            {
                Ok(content) => content,
                Err(e) => format!("[Error reading file: {e}]"),
            };
            let _ = sink.post(SinkItem::FileContent { path, content });
        });
    }

    /// Ask the AI to rewrite a file, then overwrite it once the user agrees.
    pub fn edit_file(&self, path: PathBuf, instruction: String) {
        let this = self.clone();
        tokio::spawn(async move { this.edit_task(path, instruction).await });
    }

    async fn edit_task(&self, path: PathBuf, instruction: String) {
        let read_path = path.clone();
        let content = match tokio::task::spawn_blocking(move || files::read_text(&read_path)).await {
            Ok(content) => content,
            Err(e) => format!("[Error reading file: {e}]"),
        };
        if files::is_read_error(&content) {
            self.sink.log(content);
            return;
        }

        self.sink
            .log(format!("[Edit] Requesting changes to {}", path.display()));
        let query = AiQuery::new(edit_prompt(&content, &instruction)).with_max_tokens(EDIT_MAX_TOKENS);
        let response = self.backends.ai.complete(query).await;
        if let Some(e) = &response.error {
            warn!(path = %path.display(), error = %e, "AI edit failed");
            self.sink.log(response.text);
            return;
        }
        if response.text.trim().is_empty() {
            self.sink.log("[Edit] No response from AI");
            return;
        }

        let message = format!(
            "AI returned updated content. Overwrite {}?",
            path.display()
        );
        if !self.gate().confirm("Overwrite?", &message).await {
            self.sink.log("[Edit] Overwrite declined");
            return;
        }

        let files = Arc::clone(&self.backends.files);
        let (write_path, updated) = (path.clone(), response.text.clone());
        let status = match tokio::task::spawn_blocking(move || files.write(&write_path, &updated)).await
        {
            Ok(status) => status,
            Err(e) => format!("[Error writing file: {e}]"),
        };
        self.sink.log(status);
        let _ = self.sink.post(SinkItem::FileContent {
            path,
            content: response.text,
        });
    }

    pub fn save_response(&self, path: PathBuf, text: String) {
        self.write_in_background(path, text);
    }

    pub fn capture_screen(&self, path: PathBuf) {
        let this = self.clone();
        tokio::spawn(async move { this.capture_task(path).await });
    }

    async fn capture_task(&self, path: PathBuf) {
        let capturer = Arc::clone(&self.backends.screen);
        let status = match tokio::task::spawn_blocking(move || {
            screen::capture_status(capturer.as_ref(), &path)
        })
        .await
        {
            Ok(status) => status,
            Err(e) => Err(format!("[Error capturing screen: {e}]")),
        };
        match status {
            Ok(line) => {
                self.speak("Screenshot saved");
                self.sink.log(line);
            }
            Err(marker) => self.sink.log(marker),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::ai::AiResponse;
    use crate::config::Settings;
    use crate::runner::ExecutionResult;
    use crate::sink::{self, SinkReceiver};

    #[derive(Default)]
    struct FakeAi {
        prompts: Mutex<Vec<AiQuery>>,
        reply: Mutex<Option<AiResponse>>,
    }

    impl CompletionService for FakeAi {
        fn complete(&self, query: AiQuery) -> BoxFuture<'_, AiResponse> {
            self.prompts.lock().unwrap().push(query);
            let reply = self
                .reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| AiResponse::answer("It is noon."));
            async move { reply }.boxed()
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<CommandRequest>>,
    }

    impl CommandExecutor for FakeRunner {
        fn run<'a>(&'a self, request: &'a CommandRequest) -> BoxFuture<'a, ExecutionResult> {
            self.calls.lock().unwrap().push(request.clone());
            async move {
                ExecutionResult {
                    stdout: "ok\n".into(),
                    exit_code: Some(0),
                    ..ExecutionResult::default()
                }
            }
            .boxed()
        }
    }

    #[derive(Default)]
    struct FakeSpeech {
        spoken: Mutex<Vec<String>>,
        broken: bool,
    }

    impl SpeechOutput for FakeSpeech {
        fn speak(&self, text: &str) -> anyhow::Result<()> {
            if self.broken {
                anyhow::bail!("no audio device");
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFiles {
        writes: Mutex<Vec<(PathBuf, String)>>,
    }

    impl PersistenceSink for FakeFiles {
        fn write(&self, path: &Path, content: &str) -> String {
            self.writes
                .lock()
                .unwrap()
                .push((path.to_path_buf(), content.to_string()));
            format!("Wrote {} bytes to {}", content.len(), path.display())
        }
    }

    #[derive(Default)]
    struct FakeScreen {
        shots: Mutex<Vec<PathBuf>>,
        broken: bool,
    }

    impl ScreenCapture for FakeScreen {
        fn capture(&self, path: &Path) -> anyhow::Result<()> {
            if self.broken {
                anyhow::bail!("no display");
            }
            self.shots.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct Harness {
        ai: Arc<FakeAi>,
        runner: Arc<FakeRunner>,
        speech: Arc<FakeSpeech>,
        files: Arc<FakeFiles>,
        screen: Arc<FakeScreen>,
        dispatcher: Dispatcher,
        rx: SinkReceiver,
    }

    fn harness_with(settings: Settings, speech: FakeSpeech) -> Harness {
        harness_full(settings, speech, FakeScreen::default())
    }

    fn harness_full(settings: Settings, speech: FakeSpeech, screen: FakeScreen) -> Harness {
        let ai = Arc::new(FakeAi::default());
        let runner = Arc::new(FakeRunner::default());
        let speech = Arc::new(speech);
        let files = Arc::new(FakeFiles::default());
        let screen = Arc::new(screen);
        let (sink, rx) = sink::channel();
        let backends = Backends {
            ai: ai.clone(),
            runner: runner.clone(),
            speech: speech.clone(),
            files: files.clone(),
            screen: screen.clone(),
        };
        let dispatcher = Dispatcher::new(backends, sink, config::shared(settings));
        Harness {
            ai,
            runner,
            speech,
            files,
            screen,
            dispatcher,
            rx,
        }
    }

    fn harness() -> Harness {
        harness_with(Settings::default(), FakeSpeech::default())
    }

    fn voice(text: &str) -> DispatchInput {
        DispatchInput::Voice(Utterance::voice(text))
    }

    /// Collect items until `done` matches one, or fail after two seconds.
    async fn collect_until(rx: &mut SinkReceiver, done: impl Fn(&SinkItem) -> bool) -> Vec<SinkItem> {
        let mut items = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(item) = rx.recv().await {
                let finished = done(&item);
                items.push(item);
                if finished {
                    return;
                }
            }
        })
        .await
        .expect("expected item never arrived");
        items
    }

    fn logs(items: &[SinkItem]) -> Vec<&str> {
        items
            .iter()
            .filter_map(|i| match i {
                SinkItem::Log(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_voice_ask_reaches_ai() {
        let mut h = harness();
        h.dispatcher.handle(voice("ask what time is it"));
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::SaveOffer { .. })).await;

        let prompts = h.ai.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].prompt, "what time is it");
        assert_eq!(prompts[0].max_tokens, 1500);
        assert!(items.iter().any(|i| matches!(
            i,
            SinkItem::AiResponse { prompt, response, .. }
                if prompt == "what time is it" && response.text == "It is noon."
        )));
        assert_eq!(*h.speech.spoken.lock().unwrap(), vec!["It is noon.".to_string()]);
        assert!(h.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voice_run_reaches_runner() {
        let mut h = harness();
        h.dispatcher.handle(voice("run ls"));
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Execution { .. })).await;

        assert_eq!(
            *h.runner.calls.lock().unwrap(),
            vec![CommandRequest::new("ls", false)]
        );
        assert!(logs(&items).contains(&"[Run] ls"));
        assert!(h.ai.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voice_fallback_speaks_verbatim() {
        let h = harness();
        h.dispatcher.handle(voice("hello there"));
        assert_eq!(*h.speech.spoken.lock().unwrap(), vec!["hello there".to_string()]);
        assert!(h.ai.prompts.lock().unwrap().is_empty());
        assert!(h.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_fallback_echoes() {
        let mut h = harness();
        h.dispatcher.handle(DispatchInput::Direct(DirectRequest {
            text: "hello there".into(),
            interactive: false,
        }));
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Echo(_))).await;
        assert!(matches!(&items[0], SinkItem::Echo(t) if t == "hello there"));
        assert!(h.speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_run_keeps_interactive_flag() {
        let mut h = harness();
        h.dispatcher.handle(DispatchInput::Direct(DirectRequest {
            text: "run vim notes.txt".into(),
            interactive: true,
        }));
        collect_until(&mut h.rx, |i| matches!(i, SinkItem::Execution { .. })).await;
        assert_eq!(
            *h.runner.calls.lock().unwrap(),
            vec![CommandRequest::new("vim notes.txt", true)]
        );
    }

    #[tokio::test]
    async fn test_transcription_error_is_logged_not_routed() {
        let mut h = harness();
        h.dispatcher
            .handle(DispatchInput::Voice(Utterance::transcription_error("offline")));
        let items = h.rx.drain();
        assert_eq!(logs(&items), vec!["[STT error: offline]"]);
        assert!(h.speech.spoken.lock().unwrap().is_empty());
        assert!(h.ai.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_denied_risky_command_never_runs() {
        let mut h = harness();
        h.dispatcher.handle(voice("run rm -rf /tmp/scratch"));

        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Confirm(_))).await;
        let Some(SinkItem::Confirm(request)) = items.into_iter().last() else {
            unreachable!()
        };
        assert!(request.message.contains("rm -rf /tmp/scratch"));
        request.answer(false);

        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Log(_))).await;
        assert_eq!(logs(&items), vec!["[Run] Command aborted by user"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.runner.calls.lock().unwrap().is_empty());
        assert!(!h.rx.drain().iter().any(|i| matches!(i, SinkItem::Execution { .. })));
    }

    #[tokio::test]
    async fn test_approved_risky_command_runs() {
        let mut h = harness();
        h.dispatcher.handle(voice("run sudo apt update"));

        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Confirm(_))).await;
        let Some(SinkItem::Confirm(request)) = items.into_iter().last() else {
            unreachable!()
        };
        request.answer(true);

        collect_until(&mut h.rx, |i| matches!(i, SinkItem::Execution { .. })).await;
        assert_eq!(
            *h.runner.calls.lock().unwrap(),
            vec![CommandRequest::new("sudo apt update", false)]
        );
    }

    #[tokio::test]
    async fn test_auto_write_and_save_offer() {
        let settings = Settings {
            auto_write_ai_code_to: "/tmp/out.py".into(),
            ..Settings::default()
        };
        let mut h = harness_with(settings, FakeSpeech::default());
        h.dispatcher.ask("write hello world".into());

        let items = collect_until(&mut h.rx, |i| {
            matches!(i, SinkItem::Log(t) if t.starts_with("Wrote "))
        })
        .await;
        assert!(items
            .iter()
            .any(|i| matches!(i, SinkItem::SaveOffer { text, .. } if text == "It is noon.")));
        assert_eq!(
            *h.files.writes.lock().unwrap(),
            vec![(PathBuf::from("/tmp/out.py"), "It is noon.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_speech_failure_does_not_block_other_outcomes() {
        let broken = FakeSpeech {
            broken: true,
            ..FakeSpeech::default()
        };
        let settings = Settings {
            auto_write_ai_code_to: "/tmp/answer.txt".into(),
            ..Settings::default()
        };
        let mut h = harness_with(settings, broken);
        h.dispatcher.ask("question".into());

        let mut items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::SaveOffer { .. })).await;
        items.extend(
            collect_until(&mut h.rx, |i| matches!(i, SinkItem::Log(t) if t.starts_with("Wrote ")))
                .await,
        );
        assert!(logs(&items).iter().any(|l| l.starts_with("[TTS error:")));
        assert_eq!(h.files.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ai_failure_still_offers_save() {
        let mut h = harness();
        *h.ai.reply.lock().unwrap() = Some(AiResponse::failed("timeout"));
        h.dispatcher.ask("anything".into());
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::SaveOffer { .. })).await;
        assert!(items.iter().any(|i| matches!(
            i,
            SinkItem::SaveOffer { text, .. } if text == "[AI request failed: timeout]"
        )));
    }

    #[tokio::test]
    async fn test_preview_is_truncated() {
        let settings = Settings {
            speech_preview_chars: 5,
            ..Settings::default()
        };
        let mut h = harness_with(settings, FakeSpeech::default());
        h.dispatcher.ask("q".into());
        collect_until(&mut h.rx, |i| matches!(i, SinkItem::SaveOffer { .. })).await;
        assert_eq!(*h.speech.spoken.lock().unwrap(), vec!["It is".to_string()]);
    }

    #[tokio::test]
    async fn test_speech_disabled_in_settings() {
        let settings = Settings {
            speech_output: false,
            ..Settings::default()
        };
        let h = harness_with(settings, FakeSpeech::default());
        h.dispatcher.handle(voice("hello"));
        assert!(h.speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_file_overwrites_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "old").unwrap();

        let mut h = harness();
        *h.ai.reply.lock().unwrap() = Some(AiResponse::answer("new"));
        h.dispatcher.edit_file(path.clone(), "make it new".into());

        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Confirm(_))).await;
        let Some(SinkItem::Confirm(request)) = items.into_iter().last() else {
            unreachable!()
        };
        assert_eq!(request.title, "Overwrite?");
        request.answer(true);

        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::FileContent { .. })).await;
        assert!(matches!(items.last(), Some(SinkItem::FileContent { content, .. }) if content == "new"));
        assert_eq!(*h.files.writes.lock().unwrap(), vec![(path, "new".to_string())]);

        let prompt = h.ai.prompts.lock().unwrap()[0].clone();
        assert_eq!(prompt.max_tokens, EDIT_MAX_TOKENS);
        assert!(prompt.prompt.contains("old"));
        assert!(prompt.prompt.contains("Edit request: make it new"));
    }

    #[tokio::test]
    async fn test_edit_missing_file_is_reported() {
        let mut h = harness();
        h.dispatcher
            .edit_file(PathBuf::from("/definitely/not/here.txt"), "x".into());
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Log(_))).await;
        assert!(logs(&items)[0].starts_with("[File not found: "));
        assert!(h.ai.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capture_screen_logs_and_speaks() {
        let mut h = harness();
        h.dispatcher.capture_screen(PathBuf::from("/tmp/shot.png"));
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Log(_))).await;
        assert_eq!(logs(&items), vec!["Saved screenshot to /tmp/shot.png"]);
        assert_eq!(
            *h.screen.shots.lock().unwrap(),
            vec![PathBuf::from("/tmp/shot.png")]
        );
        assert_eq!(
            *h.speech.spoken.lock().unwrap(),
            vec!["Screenshot saved".to_string()]
        );
    }

    #[tokio::test]
    async fn test_capture_screen_failure_is_reported_not_spoken() {
        let broken = FakeScreen {
            broken: true,
            ..FakeScreen::default()
        };
        let mut h = harness_full(Settings::default(), FakeSpeech::default(), broken);
        h.dispatcher.capture_screen(PathBuf::from("/tmp/shot.png"));
        let items = collect_until(&mut h.rx, |i| matches!(i, SinkItem::Log(_))).await;
        assert_eq!(logs(&items), vec!["[Error capturing screen: no display]"]);
        assert!(h.speech.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 7), "héllo w");
        assert_eq!(preview("short", 300), "short");
    }
}
