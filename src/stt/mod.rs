//! Speech-to-text behind an object-safe transcriber interface.

use crate::error::Result;

mod whisper;
pub use whisper::WhisperTranscriber;

/// Thread-safe transcription interface.
///
/// Input is utterance audio in the wire PCM format (48kHz stereo 16-bit
/// little-endian). Implementations do blocking CPU work; the turn pipeline
/// runs them on a blocking thread.
pub trait Transcriber: Send + Sync {
    /// Transcribe utterance audio to text.
    ///
    /// `language` is a hint such as "ja" or "en"; "auto" lets the engine
    /// detect the language itself.
    ///
    /// # Errors
    ///
    /// `RelayError::TranscriptionUnavailable` when the underlying model is
    /// not loadable; `RelayError::Transcription` when inference fails.
    fn transcribe(&self, pcm: &[u8], language: &str) -> Result<String>;
}
