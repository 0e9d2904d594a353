//! Voice platform seam.
//!
//! The relay drives whatever hosts the voice channel — a chat service's
//! voice stack in production, the local sound card in dev mode — through
//! these narrow traits. The pipeline never sees platform SDK types.

use crate::pipeline::messages::{ChannelId, Frame, SpeakerId};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub mod local;

/// Voice channel identifier on the platform.
pub type VoiceChannelId = u64;

/// Handle the platform's capture context uses to deliver frames.
///
/// Delivery is non-blocking: the platform may call this from its own decode
/// thread or audio callback. A full pipeline drops the frame.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Frame>,
}

impl FrameSink {
    pub(crate) fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// Hand one capture frame to the relay.
    pub fn deliver(&self, frame: Frame) {
        if self.tx.try_send(frame).is_err() {
            warn!("frame channel full, dropping frame");
        }
    }
}

/// Joins voice channels on behalf of the relay.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Connect to a voice channel, returning a live connection.
    async fn connect(&self, channel: VoiceChannelId) -> anyhow::Result<Arc<dyn VoiceConnection>>;
}

/// One live voice-channel connection.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Begin delivering capture frames to `sink`.
    fn start_capture(&self, sink: FrameSink) -> anyhow::Result<()>;

    /// Stop delivering capture frames. Idempotent.
    fn stop_capture(&self);

    /// Move this connection to another voice channel.
    async fn move_to(&self, channel: VoiceChannelId) -> anyhow::Result<()>;

    /// Play a WAV clip through the channel; resolves when playback completes.
    async fn play(&self, audio: Bytes) -> anyhow::Result<()>;

    /// Whether the connection is currently rendering audio.
    fn is_playing(&self) -> bool;

    /// Display name for a speaker, when the platform knows one.
    fn speaker_name(&self, speaker: SpeakerId) -> Option<String>;

    /// Leave the voice channel. Idempotent.
    async fn disconnect(&self) -> anyhow::Result<()>;
}

/// Outbound text surface for relay replies and notices.
#[async_trait]
pub trait TextSink: Send + Sync {
    /// Post a message to a text channel.
    async fn send(&self, channel: ChannelId, text: &str) -> anyhow::Result<()>;
}
