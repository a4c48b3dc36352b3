//! Microphone capture: cpal stream, sample ring and energy-based phrase
//! detection.

pub mod capture;
pub mod energy;
pub mod microphone;
pub mod ring_buffer;

pub use capture::input_available;
pub use microphone::Microphone;
