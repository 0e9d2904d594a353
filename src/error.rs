//! Error types for the relay pipeline.

/// Top-level error type for the voice relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Transcription backend not loadable or not ready.
    #[error("transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    /// Transcription of an utterance failed.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Dialogue model inference error.
    #[error("generation error: {0}")]
    Generation(String),

    /// Synthesis engine unreachable.
    #[error("synthesis engine unreachable: {0}")]
    SynthesisConnect(String),

    /// Speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Voice playback error.
    #[error("playback error: {0}")]
    Playback(String),

    /// A voice session already exists for this id.
    #[error("session {0} already open")]
    SessionExists(u64),

    /// No open voice session for this id.
    #[error("no open session for {0}")]
    NoSession(u64),

    /// Voice session / platform connection error.
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
