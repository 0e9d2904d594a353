//! Relay events emitted by the pipeline for UI and observability.
//!
//! This is intentionally lightweight (no audio payloads) so the pipeline
//! can emit events without blocking the frame path. Delivery is
//! best-effort: emission ignores the case where no receiver is attached.

use crate::pipeline::messages::{SessionId, SpeakerId};
use crate::platform::VoiceChannelId;

/// Events that describe what the relay is doing "right now".
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A voice session was opened on a channel.
    SessionOpened {
        session: SessionId,
        channel: VoiceChannelId,
    },
    /// A voice session was closed.
    SessionClosed { session: SessionId },
    /// A finished utterance was transcribed.
    Transcribed {
        session: SessionId,
        speaker: SpeakerId,
        text: String,
    },
    /// The dialogue model produced a reply for a turn.
    ReplyReady {
        session: SessionId,
        speaker: SpeakerId,
        text: String,
    },
    /// A turn was dropped before producing a reply.
    TurnFailed {
        session: SessionId,
        speaker: SpeakerId,
        reason: String,
    },
    /// Synthesized speech started playing into the voice channel.
    PlaybackStarted { session: SessionId },
    /// Synthesized speech finished (or failed) playing.
    PlaybackFinished { session: SessionId },
}
