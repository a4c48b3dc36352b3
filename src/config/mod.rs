//! User settings and credentials.
//!
//! Settings live in `<data_dir>/assistant_settings.json`. Missing keys take
//! their defaults, so older files keep working as fields are added. A missing
//! file is created with defaults; an unreadable one is logged and ignored.

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreError;
use paths::get_data_dir;

pub const SETTINGS_FILE: &str = "assistant_settings.json";

/// Environment variable checked before the settings file for the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// assistant_settings.json shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Speaking rate in words per minute; 150 is normal speed.
    pub tts_rate: u32,
    pub tts_volume: f32,
    pub tts_voice: String,
    /// Speak fallback utterances and AI previews aloud.
    pub speech_output: bool,
    /// When non-empty, every AI response is also written here.
    pub auto_write_ai_code_to: String,
    /// Input device name; `None` uses the system default.
    pub input_device: Option<String>,
    pub ai_model: String,
    /// OpenAI-compatible chat completions URL override.
    pub ai_endpoint: Option<String>,
    pub ai_max_tokens: u32,
    pub openai_api_key: Option<String>,
    pub command_timeout_secs: u64,
    pub speech_preview_chars: usize,
    pub confirm_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_rate: 150,
            tts_volume: 1.0,
            tts_voice: "alloy".to_string(),
            speech_output: true,
            auto_write_ai_code_to: String::new(),
            input_device: None,
            ai_model: crate::ai::openai::DEFAULT_MODEL.to_string(),
            ai_endpoint: None,
            ai_max_tokens: crate::ai::DEFAULT_MAX_TOKENS,
            openai_api_key: None,
            command_timeout_secs: 30,
            speech_preview_chars: 300,
            confirm_timeout_secs: 120,
        }
    }
}

impl Settings {
    /// Auto-write destination, if one is configured.
    pub fn auto_write_target(&self) -> Option<PathBuf> {
        let target = self.auto_write_ai_code_to.trim();
        (!target.is_empty()).then(|| PathBuf::from(target))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs.max(1))
    }

    /// JSON view for the host with the API key masked.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(key) = value.get_mut("openai_api_key") {
            if !key.is_null() {
                *key = serde_json::Value::String("***".to_string());
            }
        }
        value
    }
}

/// Settings shared between the consumer loop (writer) and workers (readers).
pub type SharedSettings = Arc<RwLock<Settings>>;

pub fn shared(settings: Settings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

/// Read a snapshot, tolerating a poisoned lock.
pub fn snapshot(settings: &SharedSettings) -> Settings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn replace(settings: &SharedSettings, new: Settings) {
    match settings.write() {
        Ok(mut guard) => *guard = new,
        Err(poisoned) => *poisoned.into_inner() = new,
    }
}

/// Path to assistant_settings.json.
pub fn settings_path() -> PathBuf {
    get_data_dir().join(SETTINGS_FILE)
}

/// Load settings from `path`, writing defaults if the file does not exist.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        let defaults = Settings::default();
        match save_settings(path, &defaults) {
            Ok(()) => info!(path = %path.display(), "Wrote default settings"),
            Err(e) => warn!("{}", e),
        }
        return defaults;
    }
    read_json_file(path).unwrap_or_default()
}

/// Persist settings atomically (temp file + rename).
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), CoreError> {
    let persist = || -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(".{}.{}.tmp", SETTINGS_FILE, std::process::id()));
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    };
    persist().map_err(|e| CoreError::ConfigPersistence(format!("{}: {e}", path.display())))
}

/// Apply a JSON object patch on top of `current`. Unknown keys are ignored.
pub fn merge_settings(current: &Settings, patch: &serde_json::Value) -> anyhow::Result<Settings> {
    let patch = patch
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("settings patch must be a JSON object"))?;
    let mut merged = serde_json::to_value(current)?;
    if let Some(obj) = merged.as_object_mut() {
        for (key, value) in patch {
            obj.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}

/// Resolve the API key: environment first, then settings.
pub fn resolve_api_key(settings: &Settings, env_value: Option<String>) -> Result<String, CoreError> {
    if let Some(key) = env_value.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        info!("Using {} from environment", API_KEY_ENV);
        return Ok(key);
    }
    if let Some(key) = settings
        .openai_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        info!("Using API key from settings");
        return Ok(key.to_string());
    }
    Err(CoreError::MissingCredentials(
        settings_path().display().to_string(),
    ))
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
