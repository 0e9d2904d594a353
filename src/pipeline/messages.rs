//! Message types passed between relay pipeline stages.

use crate::audio::frame;
use bytes::Bytes;
use std::time::Instant;
use uuid::Uuid;

/// Platform identifier for one speaker in a voice channel.
pub type SpeakerId = u64;

/// Platform identifier for a text channel.
pub type ChannelId = u64;

/// Identifier for one voice session (guild / room scope).
pub type SessionId = u64;

/// One capture frame from a single speaker.
///
/// Fixed wire format: 20ms of 48kHz stereo 16-bit little-endian PCM
/// (3840 bytes when full; trailing frames may be shorter).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Who was heard.
    pub speaker: SpeakerId,
    /// Raw PCM payload.
    pub pcm: Bytes,
    /// Timestamp when this frame was captured.
    pub captured_at: Instant,
}

/// A finalized utterance from one speaker, ready for transcription.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Unique id for tracing this utterance through the pipeline.
    pub id: Uuid,
    /// Who spoke.
    pub speaker: SpeakerId,
    /// Concatenated voiced frames in the wire PCM format.
    pub pcm: Vec<u8>,
    /// When the first voiced frame was captured.
    pub captured_at: Instant,
}

impl Utterance {
    /// Audio length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        frame::duration_ms(self.pcm.len())
    }
}
