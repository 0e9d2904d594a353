//! Local GGML Whisper transcription via whisper-rs.

use crate::audio::frame;
use crate::config::SttConfig;
use crate::error::{RelayError, Result};
use crate::stt::Transcriber;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper inference sample rate.
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Transcription service backed by a local GGML Whisper model.
///
/// The context is loaded once — eagerly via [`ensure_loaded`], or on the
/// first transcription otherwise — and shared immutably afterwards. Each
/// call creates its own `WhisperState`, so concurrent transcriptions need
/// no locking.
///
/// [`ensure_loaded`]: WhisperTranscriber::ensure_loaded
pub struct WhisperTranscriber {
    model_path: PathBuf,
    n_threads: i32,
    ctx: OnceLock<WhisperContext>,
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs — model
// weights are read-only after loading. Remaining fields are plain data.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Create a transcriber for the configured model.
    ///
    /// The model file is not touched until [`ensure_loaded`] or the first
    /// transcription.
    ///
    /// [`ensure_loaded`]: WhisperTranscriber::ensure_loaded
    pub fn new(config: &SttConfig) -> Self {
        let n_threads = if config.threads == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
                .min(4) as i32
        } else {
            config.threads as i32
        };

        info!(
            "transcriber configured with model: {}",
            config.model_path.display()
        );

        Self {
            model_path: config.model_path.clone(),
            n_threads,
            ctx: OnceLock::new(),
        }
    }

    /// Whether the model context has been loaded.
    pub fn is_ready(&self) -> bool {
        self.ctx.get().is_some()
    }

    /// Eagerly load the model so the first utterance doesn't pay the cost.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::TranscriptionUnavailable` if the model cannot
    /// be loaded.
    pub fn ensure_loaded(&self) -> Result<()> {
        self.context().map(|_| ())
    }

    /// Shared context, loading it if this is the first use.
    fn context(&self) -> Result<&WhisperContext> {
        if let Some(ctx) = self.ctx.get() {
            return Ok(ctx);
        }
        let loaded = self.load()?;
        // A concurrent loader may have won the race; either context works.
        let _ = self.ctx.set(loaded);
        self.ctx
            .get()
            .ok_or_else(|| RelayError::TranscriptionUnavailable("model not loaded".into()))
    }

    /// Load the GGML model from disk.
    fn load(&self) -> Result<WhisperContext> {
        if !self.model_path.exists() {
            return Err(RelayError::TranscriptionUnavailable(format!(
                "model not found: {}",
                self.model_path.display()
            )));
        }

        let path = self.model_path.to_str().ok_or_else(|| {
            RelayError::TranscriptionUnavailable(format!(
                "model path is not valid UTF-8: {}",
                self.model_path.display()
            ))
        })?;

        info!("loading whisper model: {path}");
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| {
                RelayError::TranscriptionUnavailable(format!("failed to load whisper model: {e}"))
            })?;
        info!("whisper model loaded");
        Ok(ctx)
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, pcm: &[u8], language: &str) -> Result<String> {
        let ctx = self.context()?;
        let audio = prepare(pcm);

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang = if language == "auto" {
            None
        } else {
            Some(language)
        };
        params.set_language(lang);
        params.set_n_threads(self.n_threads);
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let started = Instant::now();

        let mut state = ctx
            .create_state()
            .map_err(|e| RelayError::Transcription(format!("state init failed: {e}")))?;
        state
            .full(params, &audio)
            .map_err(|e| RelayError::Transcription(format!("inference failed: {e}")))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| RelayError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| RelayError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }
        let text = text.trim().to_owned();

        debug!(
            "transcribed {}ms of audio in {}ms: \"{text}\"",
            frame::duration_ms(pcm.len()),
            started.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Wire PCM → 16kHz mono f32 for inference.
fn prepare(pcm: &[u8]) -> Vec<f32> {
    let mono = frame::to_mono_f32(pcm);
    frame::resample_linear(&mono, frame::SAMPLE_RATE, WHISPER_SAMPLE_RATE)
}
