//! Shared test doubles used across multiple test modules.
//!
//! Consolidates the mock collaborators that would otherwise be duplicated
//! in `pipeline::turn::tests`, `pipeline::router::tests`, and the
//! playback tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::audio::frame::{BYTES_PER_FRAME, BYTES_PER_MS};
use crate::error::{RelayError, Result};
use crate::history::ConversationTurn;
use crate::llm::DialogueModel;
use crate::pipeline::messages::{ChannelId, Frame, SpeakerId, Utterance};
use crate::platform::{FrameSink, TextSink, VoiceChannelId, VoiceConnection};
use crate::stt::Transcriber;
use crate::tts::{SpeechSynthesizer, SynthesisQuery};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// Transcriber returning a fixed result for any audio.
pub(crate) struct FixedTranscriber {
    text: Option<String>,
}

impl FixedTranscriber {
    pub(crate) fn hears(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { text: None }
    }
}

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, _pcm: &[u8], _language: &str) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| RelayError::Transcription("decode failed".into()))
    }
}

/// Dialogue model returning a fixed reply, recording what it saw.
#[derive(Default)]
pub(crate) struct FixedModel {
    reply: Option<String>,
    pub(crate) calls: AtomicUsize,
    pub(crate) last_turns: Mutex<Vec<ConversationTurn>>,
}

impl FixedModel {
    pub(crate) fn replies(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DialogueModel for FixedModel {
    async fn generate(&self, turns: &[ConversationTurn], _system: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_turns.lock().unwrap() = turns.to_vec();
        self.reply
            .clone()
            .ok_or_else(|| RelayError::Generation("quota exhausted".into()))
    }
}

/// Text sink recording every post.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) posts: Mutex<Vec<(ChannelId, String)>>,
}

#[async_trait]
impl TextSink for RecordingSink {
    async fn send(&self, channel: ChannelId, text: &str) -> anyhow::Result<()> {
        self.posts.lock().unwrap().push((channel, text.to_string()));
        Ok(())
    }
}

/// Synthesizer producing a tiny fixed clip, counting renders.
#[derive(Default)]
pub(crate) struct CountingSynth {
    pub(crate) synth_calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for CountingSynth {
    async fn build_query(&self, text: &str, _speaker: u32) -> Result<SynthesisQuery> {
        Ok(SynthesisQuery::new(serde_json::json!({ "text": text })))
    }

    async fn synthesize(&self, _query: &SynthesisQuery, _speaker: u32) -> Result<Bytes> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"RIFF"))
    }
}

/// Connection that names speakers `user{id}` and records played clips.
///
/// `start_capture` keeps the sink so tests can push frames through the
/// same path the platform would.
#[derive(Default)]
pub(crate) struct FakeVoiceConnection {
    pub(crate) playing: AtomicBool,
    pub(crate) played: Mutex<Vec<Bytes>>,
    sink: Mutex<Option<FrameSink>>,
}

impl FakeVoiceConnection {
    pub(crate) fn sink(&self) -> FrameSink {
        self.sink
            .lock()
            .unwrap()
            .clone()
            .expect("capture not started")
    }
}

#[async_trait]
impl VoiceConnection for FakeVoiceConnection {
    fn start_capture(&self, sink: FrameSink) -> anyhow::Result<()> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop_capture(&self) {}

    async fn move_to(&self, _channel: VoiceChannelId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn play(&self, audio: Bytes) -> anyhow::Result<()> {
        self.played.lock().unwrap().push(audio);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn speaker_name(&self, speaker: SpeakerId) -> Option<String> {
        Some(format!("user{speaker}"))
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One full 20 ms frame with every sample at `amplitude`.
pub(crate) fn flat_frame(speaker: SpeakerId, amplitude: i16) -> Frame {
    let mut pcm = Vec::with_capacity(BYTES_PER_FRAME);
    for _ in 0..BYTES_PER_FRAME / 2 {
        pcm.extend_from_slice(&amplitude.to_le_bytes());
    }
    Frame {
        speaker,
        pcm: Bytes::from(pcm),
        captured_at: Instant::now(),
    }
}

/// A finalized utterance carrying `ms` milliseconds of silence.
pub(crate) fn utterance(speaker: SpeakerId, ms: u32) -> Utterance {
    Utterance {
        id: Uuid::new_v4(),
        speaker,
        pcm: vec![0; ms as usize * BYTES_PER_MS],
        captured_at: Instant::now(),
    }
}
