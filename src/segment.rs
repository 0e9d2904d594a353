//! Per-speaker utterance segmentation using RMS energy.
//!
//! Buffers voiced frames and finalizes an utterance once sustained silence
//! is observed. Finalization is deferred while the speaker already has a
//! turn in flight; the buffer keeps accumulating and the silence condition
//! is re-checked on each subsequent frame.

use crate::audio::frame::{self, BYTES_PER_FRAME, BYTES_PER_MS, FRAME_MS};
use crate::config::SegmenterConfig;
use crate::gate::{ProcessingGate, SpeakerSlot};
use crate::pipeline::messages::{Frame, Utterance};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum utterance length. Anything shorter is treated as a blip
/// (cough, keyboard thump) and discarded at finalize.
pub const MIN_UTTERANCE_MS: u64 = 500;
const MIN_UTTERANCE_BYTES: usize = MIN_UTTERANCE_MS as usize * BYTES_PER_MS;

/// Utterance segmenter for one speaker in one voice session.
///
/// Owned exclusively by that speaker's lane task; never shared.
pub struct SpeechSegmenter {
    /// Accumulated voiced audio for the current utterance.
    buffer: Vec<u8>,
    /// Number of consecutive silent frames since the last voiced frame.
    silence_count: u32,
    /// Consecutive silent frames required to end an utterance.
    silence_limit: u32,
    /// RMS threshold: frames at or above are voiced.
    threshold: i32,
    /// Buffer cap; oldest frames are dropped beyond this.
    max_buffer_bytes: usize,
    /// This speaker's turn admission slot. Finalization defers while held.
    slot: SpeakerSlot,
    /// When the current utterance's first voiced frame was captured.
    started_at: Option<Instant>,
    /// Whether the current overflow episode has been logged.
    overflow_warned: bool,
}

impl SpeechSegmenter {
    /// Create a segmenter for one speaker.
    pub fn new(config: &SegmenterConfig, slot: SpeakerSlot) -> Self {
        let silence_limit = config.silence_duration_ms.div_ceil(FRAME_MS).max(1);
        // The cap never sits below the minimum utterance length.
        let max_buffer_bytes =
            (config.max_utterance_ms as usize * BYTES_PER_MS).max(MIN_UTTERANCE_BYTES);

        Self {
            buffer: Vec::new(),
            silence_count: 0,
            silence_limit,
            threshold: config.silence_rms_threshold,
            max_buffer_bytes,
            slot,
            started_at: None,
            overflow_warned: false,
        }
    }

    /// Process one capture frame; returns a finalized utterance when
    /// sustained silence closes one.
    ///
    /// Bounded-time: RMS over the frame plus buffer bookkeeping. Never
    /// calls out of the segmenter.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<Utterance> {
        let energy = frame::rms(&frame.pcm);

        if energy >= self.threshold {
            if self.buffer.is_empty() {
                self.started_at = Some(frame.captured_at);
            }
            self.silence_count = 0;
            self.buffer.extend_from_slice(&frame.pcm);
            self.enforce_cap();
            return None;
        }

        // Silent frame. Nothing buffered means nothing to close.
        if self.buffer.is_empty() {
            return None;
        }

        self.silence_count += 1;
        if self.silence_count < self.silence_limit {
            return None;
        }

        // Sustained silence — but hold the segment while this speaker's
        // previous turn is still in flight.
        if self.slot.is_in_flight() {
            return None;
        }

        self.finalize(frame)
    }

    /// Close out the buffered utterance and reset for the next one.
    fn finalize(&mut self, frame: &Frame) -> Option<Utterance> {
        let pcm = std::mem::take(&mut self.buffer);
        let started_at = self.started_at.take().unwrap_or_else(Instant::now);
        self.silence_count = 0;
        self.overflow_warned = false;

        if pcm.len() < MIN_UTTERANCE_BYTES {
            debug!(
                "dropping short utterance from speaker {}: {}ms",
                frame.speaker,
                frame::duration_ms(pcm.len())
            );
            return None;
        }

        Some(Utterance {
            id: uuid::Uuid::new_v4(),
            speaker: frame.speaker,
            pcm,
            captured_at: started_at,
        })
    }

    /// Drop oldest whole frames once the buffer exceeds the cap.
    fn enforce_cap(&mut self) {
        if self.buffer.len() <= self.max_buffer_bytes {
            return;
        }
        if !self.overflow_warned {
            warn!(
                "utterance buffer over {}ms cap, dropping oldest audio",
                self.max_buffer_bytes / BYTES_PER_MS
            );
            self.overflow_warned = true;
        }
        while self.buffer.len() > self.max_buffer_bytes {
            self.buffer.drain(..BYTES_PER_FRAME.min(self.buffer.len()));
        }
    }
}

/// One utterance located within a recorded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSpan {
    /// Offset of the utterance's first voiced frame from the clip start.
    pub start_ms: u64,
    /// Length of the voiced audio; silence gaps inside are not counted.
    pub duration_ms: u64,
}

/// Replay a recorded clip through a fresh segmenter.
///
/// Offline counterpart of a live speaker lane: wire frames are fed in
/// order on a 20ms cadence, and speech still buffered when the clip ends
/// is closed out with trailing silence. Returns the utterances in clip
/// order.
pub fn scan_frames(
    frames: impl IntoIterator<Item = Bytes>,
    config: &SegmenterConfig,
) -> Vec<ClipSpan> {
    let gate = ProcessingGate::new();
    let mut segmenter = SpeechSegmenter::new(config, gate.slot(0));
    let epoch = Instant::now();

    let scan = |segmenter: &mut SpeechSegmenter, pcm: Bytes, at_ms: u64| {
        let frame = Frame {
            speaker: 0,
            pcm,
            captured_at: epoch + Duration::from_millis(at_ms),
        };
        segmenter.on_frame(&frame).map(|utterance| ClipSpan {
            start_ms: utterance.captured_at.duration_since(epoch).as_millis() as u64,
            duration_ms: utterance.duration_ms(),
        })
    };

    let mut spans = Vec::new();
    let mut at_ms = 0u64;
    for pcm in frames {
        if let Some(span) = scan(&mut segmenter, pcm, at_ms) {
            spans.push(span);
        }
        at_ms += u64::from(FRAME_MS);
    }

    // Close out speech still buffered when the clip ends.
    for _ in 0..=config.silence_duration_ms.div_ceil(FRAME_MS) {
        if let Some(span) = scan(&mut segmenter, Bytes::new(), at_ms) {
            spans.push(span);
        }
        at_ms += u64::from(FRAME_MS);
    }

    spans
}
