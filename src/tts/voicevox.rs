//! VOICEVOX engine client.
//!
//! Speaks the engine's two-call HTTP protocol: `POST /audio_query` with
//! text and speaker passed as query parameters (no body), then
//! `POST /synthesis` with the adjusted query JSON as the body. The
//! synthesis response is a complete WAV clip.

use crate::config::TtsConfig;
use crate::error::{RelayError, Result};
use crate::tts::{SpeechSynthesizer, SynthesisQuery};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// HTTP client for a running VOICEVOX-compatible engine.
pub struct VoicevoxSynthesizer {
    client: reqwest::Client,
    engine_url: String,
}

impl VoicevoxSynthesizer {
    /// Create a client for the configured engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Synthesis(format!("failed to build HTTP client: {e}")))?;

        info!("speech engine configured: {}", config.engine_url);

        Ok(Self {
            client,
            engine_url: config.engine_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Connection-level failures get their own variant so callers can tell
/// "engine is down" apart from "engine rejected this request".
fn map_transport_err(context: &str, e: reqwest::Error) -> RelayError {
    if e.is_connect() || e.is_timeout() {
        RelayError::SynthesisConnect(format!("{context}: {e}"))
    } else {
        RelayError::Synthesis(format!("{context}: {e}"))
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxSynthesizer {
    async fn build_query(&self, text: &str, speaker: u32) -> Result<SynthesisQuery> {
        let url = format!("{}/audio_query", self.engine_url);
        let response = self
            .client
            .post(&url)
            .query(&[("text", text), ("speaker", &speaker.to_string())])
            .send()
            .await
            .map_err(|e| map_transport_err("audio query request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Synthesis(format!(
                "audio query returned {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Synthesis(format!("invalid audio query response: {e}")))?;

        Ok(SynthesisQuery::new(payload))
    }

    async fn synthesize(&self, query: &SynthesisQuery, speaker: u32) -> Result<Bytes> {
        let mut payload = query.payload().clone();
        payload["speedScale"] = serde_json::json!(query.speed);

        let url = format!("{}/synthesis", self.engine_url);
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("speaker", speaker.to_string())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_transport_err("synthesis request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Synthesis(format!(
                "synthesis returned {status}: {body}"
            )));
        }

        let wav = response
            .bytes()
            .await
            .map_err(|e| RelayError::Synthesis(format!("failed to read synthesis body: {e}")))?;

        debug!(
            "synthesized {} bytes in {:.2}s",
            wav.len(),
            started.elapsed().as_secs_f32()
        );

        Ok(wav)
    }
}
