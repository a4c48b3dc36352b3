//! File persistence sink and safe reads.
//!
//! Nothing here returns an error: every outcome is a status string the
//! consumer can show as-is.

use std::path::Path;

use tracing::{info, warn};

/// Destination for AI output (auto-write target, save dialog, file edits).
pub trait PersistenceSink: Send + Sync {
    /// Write `content` to `path`, returning a status line for the log pane.
    fn write(&self, path: &Path, content: &str) -> String;
}

/// Writes straight to the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl PersistenceSink for LocalFiles {
    fn write(&self, path: &Path, content: &str) -> String {
        match std::fs::write(path, content) {
            Ok(()) => {
                let status = format!("Wrote {} bytes to {}", content.len(), path.display());
                info!("{}", status);
                status
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File write failed");
                format!("[Error writing file: {e}]")
            }
        }
    }
}

/// Read a text file, replacing invalid UTF-8. Missing files and read errors
/// come back as bracketed markers.
pub fn read_text(path: &Path) -> String {
    if !path.exists() {
        return format!("[File not found: {}]", path.display());
    }
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "File read failed");
            format!("[Error reading file: {e}]")
        }
    }
}

/// Whether `text` is one of the markers produced by [`read_text`].
pub fn is_read_error(text: &str) -> bool {
    text.starts_with("[File not found: ") || text.starts_with("[Error reading file: ")
}
