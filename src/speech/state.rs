//! Atomic capture state.
//!
//! The consumer's start/stop calls write it, the capture loop reads it. The
//! active flag and the loop generation share one `AtomicU64` (low bit =
//! active) so a loop that has been superseded can never clear the flag of
//! its successor.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Capture loop phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CapturePhase {
    /// No loop running (or the running one is about to exit).
    Idle = 0,
    /// Measuring ambient noise before the first listen.
    Calibrating = 1,
    /// Waiting for speech onset or recording a phrase.
    Listening = 2,
    /// Captured audio is with the speech-to-text engine.
    Transcribing = 3,
}

impl CapturePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Calibrating,
            2 => Self::Listening,
            3 => Self::Transcribing,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Calibrating => write!(f, "calibrating"),
            Self::Listening => write!(f, "listening"),
            Self::Transcribing => write!(f, "transcribing"),
        }
    }
}

const ACTIVE_BIT: u64 = 1;

/// Process-wide capture state, shareable via `Arc`.
#[derive(Debug, Default)]
pub struct CaptureState {
    /// `generation << 1 | active`.
    control: AtomicU64,
    phase: AtomicU8,
}

impl CaptureState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_active(&self) -> bool {
        self.control.load(Ordering::Acquire) & ACTIVE_BIT != 0
    }

    pub fn phase(&self) -> CapturePhase {
        CapturePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Idle -> active. Returns the new loop generation, or `None` if a loop
    /// is already active.
    pub(crate) fn activate(&self) -> Option<u64> {
        let mut current = self.control.load(Ordering::Acquire);
        loop {
            if current & ACTIVE_BIT != 0 {
                return None;
            }
            let generation = (current >> 1) + 1;
            match self.control.compare_exchange(
                current,
                (generation << 1) | ACTIVE_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(generation),
                Err(actual) => current = actual,
            }
        }
    }

    /// Clear the active flag. Returns whether a loop was active.
    pub(crate) fn deactivate(&self) -> bool {
        self.control.fetch_and(!ACTIVE_BIT, Ordering::AcqRel) & ACTIVE_BIT != 0
    }

    /// Whether the loop of `generation` should keep going.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.control.load(Ordering::Acquire) == (generation << 1) | ACTIVE_BIT
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.control.load(Ordering::Acquire) >> 1 == generation
    }

    /// Record a phase change, unless a newer loop has started.
    pub(crate) fn set_phase(&self, generation: u64, phase: CapturePhase) {
        if self.is_latest(generation) {
            self.phase.store(phase as u8, Ordering::Release);
        }
    }

    /// Called by the loop of `generation` on exit: clears the active flag if
    /// it still owns it and returns the phase to Idle.
    pub(crate) fn finish(&self, generation: u64) {
        let _ = self.control.compare_exchange(
            (generation << 1) | ACTIVE_BIT,
            generation << 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.set_phase(generation, CapturePhase::Idle);
    }
}
