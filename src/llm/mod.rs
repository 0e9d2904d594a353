//! Dialogue generation.
//!
//! The pipeline talks to an async [`DialogueModel`]; the production
//! implementation is [`ChatApiModel`], an OpenAI-compatible chat
//! completions client (Ollama, vLLM, llama.cpp server, hosted providers).

pub mod api;

pub use api::ChatApiModel;

use crate::error::Result;
use crate::history::ConversationTurn;
use async_trait::async_trait;

/// Async dialogue model interface.
#[async_trait]
pub trait DialogueModel: Send + Sync {
    /// Generate the next reply for a conversation.
    ///
    /// `turns` is the committed channel history oldest-first, with the
    /// latest user turn already included. `system` is the persona prompt.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Generation` on any failure — transport, quota,
    /// or a malformed response.
    async fn generate(&self, turns: &[ConversationTurn], system: &str) -> Result<String>;
}
