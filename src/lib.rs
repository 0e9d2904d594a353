//! Kaiwa: a conversational relay for multi-speaker voice channels.
//!
//! Per-speaker PCM frames are segmented by silence, transcribed, answered
//! by a dialogue model, and delivered back as text and optional speech:
//! Voice channel → segmentation → STT → LLM → text reply + TTS playback
//!
//! # Architecture
//!
//! The relay is built from small stages connected by async channels:
//! - **Frame routing**: per-speaker lanes fan out from one session receiver
//! - **Segmentation**: energy-based silence detection finalizes utterances
//! - **Admission**: at most one turn in flight per speaker
//! - **STT**: transcribes utterances with whisper.cpp via `whisper-rs`
//! - **LLM**: generates replies through an OpenAI-compatible chat API
//! - **TTS**: renders speech through a VOICEVOX-style engine
//! - **Playback**: one clip at a time per session; busy requests refused

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod platform;
pub mod playback;
pub mod relay;
pub mod segment;
pub mod session;
pub mod stt;
pub mod tts;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use events::RelayEvent;
pub use playback::SpeakOutcome;
pub use relay::Relay;
