//! Speech-to-text adapters.

pub mod cloud;

pub use cloud::OpenAiWhisper;
