//! Reply playback into the voice channel.
//!
//! Speech is rendered through the engine's two-call protocol (build a
//! prosody query, then synthesize it with the configured speed) and
//! played through the session's voice connection. A session plays at
//! most one clip at a time: a speak request that lands while another is
//! synthesizing or playing is refused outright, never queued.

use crate::config::TtsConfig;
use crate::error::{RelayError, Result};
use crate::events::RelayEvent;
use crate::session::VoiceSession;
use crate::tts::SpeechSynthesizer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Outcome of a speak request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Synthesis and playback ran to completion.
    Played,
    /// The session was already synthesizing or playing; nothing was queued.
    Busy,
}

/// Serializes reply speech per session.
pub struct PlaybackSequencer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speaker: u32,
    speed: f32,
    events: Option<broadcast::Sender<RelayEvent>>,
}

impl PlaybackSequencer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, config: &TtsConfig) -> Self {
        Self {
            synthesizer,
            speaker: config.speaker,
            speed: config.speed,
            events: None,
        }
    }

    /// Attach a relay event sender for observability.
    #[must_use]
    pub fn with_events(mut self, tx: broadcast::Sender<RelayEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Speak `text` into the session's voice channel.
    ///
    /// Returns [`SpeakOutcome::Busy`] without synthesizing when the
    /// connection is already rendering audio or another speak call holds
    /// the session's busy window.
    ///
    /// # Errors
    ///
    /// Synthesis errors pass through unchanged; playback failures surface
    /// as `RelayError::Playback`. The busy window is released on every
    /// path, success or failure.
    pub async fn speak(&self, session: &VoiceSession, text: &str) -> Result<SpeakOutcome> {
        if session.connection().is_playing() {
            return Ok(SpeakOutcome::Busy);
        }
        let Some(_window) = BusyWindow::claim(session.playback_busy()) else {
            return Ok(SpeakOutcome::Busy);
        };

        let mut query = self.synthesizer.build_query(text, self.speaker).await?;
        query.speed = self.speed;
        let wav = self.synthesizer.synthesize(&query, self.speaker).await?;

        debug!(
            "playing {} byte clip on session {}",
            wav.len(),
            session.id()
        );
        self.emit(RelayEvent::PlaybackStarted {
            session: session.id(),
        });
        let played = session.connection().play(wav).await;
        self.emit(RelayEvent::PlaybackFinished {
            session: session.id(),
        });
        played.map_err(|e| RelayError::Playback(e.to_string()))?;

        Ok(SpeakOutcome::Played)
    }
}

/// Clears the session's busy flag when the speak attempt ends.
struct BusyWindow {
    flag: Arc<AtomicBool>,
}

impl BusyWindow {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BusyWindow {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
