//! Speech synthesis behind a two-call engine interface.
//!
//! VOICEVOX-style engines synthesize in two steps: build an audio query
//! for the text, optionally adjust prosody on the query, then render the
//! query to a WAV clip. The relay only ever touches the speed knob between
//! the two calls.

mod voicevox;

pub use voicevox::VoicevoxSynthesizer;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Prosody query produced by [`SpeechSynthesizer::build_query`].
///
/// The engine-native payload rides along opaquely; `speed` is the one
/// attribute callers set before synthesis.
#[derive(Debug, Clone)]
pub struct SynthesisQuery {
    /// Speech speed multiplier applied at synthesis time.
    pub speed: f32,
    payload: serde_json::Value,
}

impl SynthesisQuery {
    /// Wrap an engine query payload with the default speed.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            speed: 1.0,
            payload,
        }
    }

    /// Engine-native query payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// Async speech synthesis interface.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Build the prosody query for `text` in the given engine voice.
    ///
    /// # Errors
    ///
    /// `RelayError::SynthesisConnect` when the engine is unreachable,
    /// `RelayError::Synthesis` for other failures.
    async fn build_query(&self, text: &str, speaker: u32) -> Result<SynthesisQuery>;

    /// Render a query to a WAV clip.
    ///
    /// # Errors
    ///
    /// Same mapping as [`build_query`](SpeechSynthesizer::build_query).
    async fn synthesize(&self, query: &SynthesisQuery, speaker: u32) -> Result<Bytes>;
}
