//! One conversation turn, voice or text, end to end.
//!
//! The voice path goes transcribe → history → generate → history → post,
//! then optionally speaks the reply back into the voice channel. The text
//! path skips transcription and speech and shares everything else,
//! including the per-channel history.
//!
//! Nothing in here returns an error to the caller: every failure is
//! logged, surfaced to the text channel where the design calls for it,
//! and otherwise dropped. The caller's admission guard releases the
//! speaker no matter which path runs.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::events::RelayEvent;
use crate::history::{ConversationStore, ConversationTurn};
use crate::llm::DialogueModel;
use crate::pipeline::messages::{ChannelId, Utterance};
use crate::platform::TextSink;
use crate::playback::{PlaybackSequencer, SpeakOutcome};
use crate::session::VoiceSession;
use crate::stt::Transcriber;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Posted when reply generation fails; the user turn stays unanswered.
const GENERATION_NOTICE: &str = "I hit an internal error while coming up with a reply.";
/// Posted when the speech engine is unreachable during auto-speak.
const ENGINE_DOWN_NOTICE: &str =
    "I couldn't reach the speech engine, so that reply stays text-only.";
/// Posted when synthesis or playback fails during auto-speak.
const SPEECH_FAILED_NOTICE: &str = "I couldn't read that reply out loud.";

/// Runs conversation turns against the configured collaborators.
pub struct TurnPipeline {
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn DialogueModel>,
    sequencer: Arc<PlaybackSequencer>,
    store: Arc<ConversationStore>,
    text: Arc<dyn TextSink>,
    persona: String,
    language: String,
    events: Option<broadcast::Sender<RelayEvent>>,
}

impl TurnPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        model: Arc<dyn DialogueModel>,
        sequencer: Arc<PlaybackSequencer>,
        store: Arc<ConversationStore>,
        text: Arc<dyn TextSink>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            transcriber,
            model,
            sequencer,
            store,
            text,
            persona: config.llm.persona.clone(),
            language: config.stt.language.clone(),
            events: None,
        }
    }

    /// Attach a relay event sender for observability.
    #[must_use]
    pub fn with_events(mut self, tx: broadcast::Sender<RelayEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run one voice turn from a finalized utterance.
    pub async fn run_voice_turn(&self, session: &VoiceSession, utterance: Utterance) {
        let speaker = utterance.speaker;
        let session_id = session.id();
        let duration_ms = utterance.duration_ms();
        debug!(
            "transcribing utterance {} from speaker {speaker} ({duration_ms}ms)",
            utterance.id
        );

        let heard = match self.transcribe(utterance).await {
            Ok(text) => text,
            Err(e) => {
                // The utterance vanishes without a user-visible message.
                warn!("transcription failed for speaker {speaker}: {e}");
                self.emit(RelayEvent::TurnFailed {
                    session: session_id,
                    speaker,
                    reason: e.to_string(),
                });
                return;
            }
        };
        let heard = heard.trim().to_string();
        if heard.is_empty() {
            debug!("blank transcription for speaker {speaker} ({duration_ms}ms), dropping turn");
            return;
        }

        info!("speaker {speaker} said: {heard}");
        self.emit(RelayEvent::Transcribed {
            session: session_id,
            speaker,
            text: heard.clone(),
        });

        let channel = session.text_channel();
        self.store.push(channel, ConversationTurn::user(heard.clone()));

        let reply = match self.generate(channel).await {
            Ok(text) => text,
            Err(e) => {
                // The user turn stays in history unanswered.
                error!("reply generation failed for speaker {speaker}: {e}");
                self.emit(RelayEvent::TurnFailed {
                    session: session_id,
                    speaker,
                    reason: e.to_string(),
                });
                self.post(channel, GENERATION_NOTICE).await;
                return;
            }
        };
        self.store.push(channel, ConversationTurn::model(reply.clone()));
        self.emit(RelayEvent::ReplyReady {
            session: session_id,
            speaker,
            text: reply.clone(),
        });

        let name = session
            .connection()
            .speaker_name(speaker)
            .unwrap_or_else(|| format!("speaker {speaker}"));
        self.post(channel, &format!("{name}: {heard}\n{reply}")).await;

        if session.auto_speak() && !session.connection().is_playing() {
            self.speak_reply(session, &reply).await;
        }
    }

    /// Run one text turn. The message is already visible in the channel,
    /// so only the reply is posted.
    pub async fn run_text_turn(&self, channel: ChannelId, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        self.store.push(channel, ConversationTurn::user(text));
        match self.generate(channel).await {
            Ok(reply) => {
                self.store.push(channel, ConversationTurn::model(reply.clone()));
                self.post(channel, &reply).await;
            }
            Err(e) => {
                error!("reply generation failed on channel {channel}: {e}");
                self.post(channel, GENERATION_NOTICE).await;
            }
        }
    }

    /// Transcription is CPU-bound, so it runs on the blocking pool.
    async fn transcribe(&self, utterance: Utterance) -> Result<String> {
        let transcriber = Arc::clone(&self.transcriber);
        let language = self.language.clone();
        tokio::task::spawn_blocking(move || transcriber.transcribe(&utterance.pcm, &language))
            .await
            .map_err(|e| RelayError::Transcription(format!("transcription task failed: {e}")))?
    }

    async fn generate(&self, channel: ChannelId) -> Result<String> {
        let turns = self.store.snapshot(channel);
        self.model.generate(&turns, &self.persona).await
    }

    async fn post(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self.text.send(channel, text).await {
            warn!("failed to post to channel {channel}: {e}");
        }
    }

    async fn speak_reply(&self, session: &VoiceSession, reply: &str) {
        match self.sequencer.speak(session, reply).await {
            Ok(SpeakOutcome::Played) => {}
            Ok(SpeakOutcome::Busy) => {
                debug!("session {} already speaking, reply stays text-only", session.id());
            }
            Err(e) => {
                warn!("speech failed on session {}: {e}", session.id());
                let notice = match &e {
                    RelayError::SynthesisConnect(_) => ENGINE_DOWN_NOTICE,
                    _ => SPEECH_FAILED_NOTICE,
                };
                self.post(session.text_channel(), notice).await;
            }
        }
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
