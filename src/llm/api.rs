//! OpenAI-compatible chat completions client.
//!
//! Works against any server implementing the chat completions API:
//! - Ollama (`http://localhost:11434`)
//! - vLLM, llama.cpp server, LM Studio
//! - Hosted providers with an OpenAI-compatible surface

use crate::config::LlmConfig;
use crate::error::{RelayError, Result};
use crate::history::{ConversationTurn, Role};
use crate::llm::DialogueModel;
use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::info;

/// Non-streaming chat completions client.
pub struct ChatApiModel {
    client: reqwest::Client,
    api_url: String,
    api_model: String,
    api_key: String,
    max_tokens: usize,
    temperature: f64,
}

impl ChatApiModel {
    /// Create a client for the configured API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Generation(format!("failed to build HTTP client: {e}")))?;

        info!(
            "dialogue API configured: {} model={}",
            config.api_url, config.api_model
        );

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_model: config.api_model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        let base = match self.api_url.strip_suffix("/v1") {
            Some(u) => u,
            None => &self.api_url,
        };
        let base = base.trim_end_matches('/');
        format!("{base}/v1/chat/completions")
    }
}

#[async_trait]
impl DialogueModel for ChatApiModel {
    async fn generate(&self, turns: &[ConversationTurn], system: &str) -> Result<String> {
        let messages = build_messages(turns, system);
        let body = json!({
            "model": self.api_model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let started = Instant::now();

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Generation(format!("API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Generation(format!(
                "API returned {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Generation(format!("malformed API response: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| RelayError::Generation("API response missing message content".into()))?;

        let text = strip_think_blocks(content);

        info!(
            "generated {} chars in {}ms",
            text.len(),
            started.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Map the conversation onto the chat completions message array.
fn build_messages(turns: &[ConversationTurn], system: &str) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(json!({"role": "system", "content": system}));
    for turn in turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Model => "assistant",
        };
        messages.push(json!({"role": role, "content": turn.text}));
    }
    messages
}

/// Remove `<think>...</think>` blocks some models emit before the reply.
fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                // Unterminated reasoning block: drop the tail.
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_owned()
}
