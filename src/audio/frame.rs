//! Wire PCM frame format and sample conversions.
//!
//! Voice platforms deliver capture audio as fixed 20ms frames of 48kHz
//! stereo 16-bit little-endian PCM. Everything upstream of transcription
//! works on that byte layout.

use bytes::Bytes;

/// Capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
/// Interleaved channel count.
pub const CHANNELS: u16 = 2;
/// Frame length in milliseconds.
pub const FRAME_MS: u32 = 20;
/// Samples per channel in one frame.
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE as usize / 1_000) * FRAME_MS as usize;
/// Bytes in one full frame (interleaved stereo, 2 bytes per sample).
pub const BYTES_PER_FRAME: usize = SAMPLES_PER_FRAME * CHANNELS as usize * 2;
/// Bytes per millisecond of audio in the wire format.
pub const BYTES_PER_MS: usize = BYTES_PER_FRAME / FRAME_MS as usize;

/// Root-mean-square amplitude over 16-bit little-endian samples.
///
/// Operates on raw frame bytes; a trailing odd byte is ignored. Returns 0
/// for empty input, so an empty frame reads as silence.
pub fn rms(pcm: &[u8]) -> i32 {
    let n = pcm.len() / 2;
    if n == 0 {
        return 0;
    }
    let mut sum_squares = 0u64;
    for pair in pcm.chunks_exact(2) {
        let v = i64::from(i16::from_le_bytes([pair[0], pair[1]]));
        sum_squares += (v * v) as u64;
    }
    ((sum_squares / n as u64) as f64).sqrt() as i32
}

/// Duration in milliseconds of a wire-format byte buffer.
pub fn duration_ms(pcm_len: usize) -> u64 {
    (pcm_len / BYTES_PER_MS) as u64
}

/// Downmix interleaved stereo 16-bit bytes to mono f32 in \[-1, 1\].
pub fn to_mono_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(4)
        .map(|frame| {
            let l = f32::from(i16::from_le_bytes([frame[0], frame[1]]));
            let r = f32::from(i16::from_le_bytes([frame[2], frame[3]]));
            (l + r) / 2.0 / 32_768.0
        })
        .collect()
}

/// Linear-interpolation resampler.
///
/// Converts audio from `src_rate` to `dst_rate`. For speech processing
/// (48kHz → 16kHz) this is sufficient quality — no anti-alias filter needed
/// since human speech energy is below 8kHz.
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}

/// Clamp and scale an f32 sample in \[-1, 1\] to i16.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
}

/// Accumulates arbitrarily-sized stereo i16 sample runs and yields exact
/// wire frames.
///
/// Capture callbacks deliver whatever buffer size the device favours; the
/// chunker re-blocks that stream into complete 20ms frames, carrying the
/// remainder forward.
#[derive(Default)]
pub struct FrameChunker {
    pending: Vec<u8>,
}

impl FrameChunker {
    /// Create an empty chunker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append interleaved stereo i16 samples; returns all complete frames.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Bytes> {
        self.pending.reserve(samples.len() * 2);
        for s in samples {
            self.pending.extend_from_slice(&s.to_le_bytes());
        }

        let mut frames = Vec::new();
        while self.pending.len() >= BYTES_PER_FRAME {
            let rest = self.pending.split_off(BYTES_PER_FRAME);
            let frame = std::mem::replace(&mut self.pending, rest);
            frames.push(Bytes::from(frame));
        }
        frames
    }
}

/// Re-block decoded mono audio into wire frames.
///
/// Resamples to the capture rate, scales to 16-bit, and duplicates the
/// mono signal across both channels. A trailing partial frame is dropped.
pub fn to_wire_frames(mono: &[f32], src_rate: u32) -> Vec<Bytes> {
    let resampled = resample_linear(mono, src_rate, SAMPLE_RATE);
    let mut stereo = Vec::with_capacity(resampled.len() * 2);
    for &sample in &resampled {
        let value = f32_to_i16(sample);
        stereo.push(value);
        stereo.push(value);
    }
    FrameChunker::new().push(&stereo)
}
