//! Screen capture to PNG.
//!
//! [`PrimaryMonitor`] grabs the primary display through xcap; encoding is
//! left to the `image` crate. Capture is blocking, so callers run it on the
//! blocking pool.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{info, warn};
use xcap::Monitor;

/// Grabs the screen into an image file.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self, path: &Path) -> anyhow::Result<()>;
}

/// The primary monitor, or the first one if none reports as primary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryMonitor;

impl ScreenCapture for PrimaryMonitor {
    fn capture(&self, path: &Path) -> anyhow::Result<()> {
        let monitors = Monitor::all().map_err(xcap_error)?;
        let primary: Vec<bool> = monitors
            .iter()
            .map(|m| m.is_primary().unwrap_or(false))
            .collect();
        let index = pick_monitor(&primary).ok_or_else(|| anyhow::anyhow!("no monitors found"))?;
        let image = monitors[index].capture_image().map_err(xcap_error)?;
        image.save_with_format(path, ImageFormat::Png)?;
        info!(path = %path.display(), width = image.width(), height = image.height(), "Captured screen");
        Ok(())
    }
}

fn xcap_error(e: xcap::XCapError) -> anyhow::Error {
    anyhow::anyhow!("{e}")
}

fn pick_monitor(primary: &[bool]) -> Option<usize> {
    if primary.is_empty() {
        return None;
    }
    Some(primary.iter().position(|p| *p).unwrap_or(0))
}

/// Where to save a screenshot. Requests without an extension get `.png`;
/// no request means a timestamped file in the data directory.
pub fn screenshot_path(requested: Option<&str>) -> PathBuf {
    match requested.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => {
            let path = PathBuf::from(p);
            if path.extension().is_none() {
                path.with_extension("png")
            } else {
                path
            }
        }
        None => crate::config::paths::get_data_dir().join(format!(
            "screenshot-{}.png",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        )),
    }
}

/// Run a capture and turn the outcome into a log-pane line.
pub fn capture_status(screen: &dyn ScreenCapture, path: &Path) -> Result<String, String> {
    match screen.capture(path) {
        Ok(()) => Ok(format!("Saved screenshot to {}", path.display())),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Screen capture failed");
            Err(format!("[Error capturing screen: {e}]"))
        }
    }
}
