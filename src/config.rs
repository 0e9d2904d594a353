//! Configuration types for the voice relay.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Audio device settings (local platform adapter).
    pub audio: AudioConfig,
    /// Utterance segmentation settings.
    pub segmenter: SegmenterConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Dialogue model settings.
    pub llm: LlmConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
    /// Conversation history settings.
    pub history: HistoryConfig,
}

/// Audio device configuration for the local platform adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

/// Utterance segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// RMS energy threshold for speech detection.
    ///
    /// Frames whose RMS over 16-bit samples is at or above this value are
    /// classified as speech. Typical values for voice-chat capture:
    ///   - 150: very sensitive (picks up quiet speech and some noise)
    ///   - 300: normal sensitivity (default)
    ///   - 600: reduced sensitivity (noisy channels)
    pub silence_rms_threshold: i32,
    /// Sustained silence duration in ms that ends an utterance.
    pub silence_duration_ms: u32,
    /// Maximum buffered utterance length in ms.
    ///
    /// When a speaker's buffer grows past this (for example while their slot
    /// is busy and finalization is deferred), the oldest frames are dropped
    /// so the most recent audio is kept.
    pub max_utterance_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_rms_threshold: 300,
            silence_duration_ms: 1_000,
            max_utterance_ms: 30_000,
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Path to the GGML Whisper model file.
    pub model_path: PathBuf,
    /// Language hint passed to the transcriber (e.g. "ja", "en").
    pub language: String,
    /// Threads used for decoding (0 = number of physical cores, capped at 4).
    pub threads: usize,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: default_data_dir().join("models").join("ggml-base.bin"),
            language: "ja".to_owned(),
            threads: 0,
        }
    }
}

/// Dialogue model configuration (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the API server.
    pub api_url: String,
    /// Model name to request from the API.
    pub api_model: String,
    /// API key for the remote provider.
    ///
    /// For local servers (Ollama/LM Studio/vLLM), this is typically empty.
    pub api_key: String,
    /// System prompt describing how the relay should behave in conversation.
    pub persona: String,
    /// Maximum tokens to generate per reply.
    pub max_tokens: usize,
    /// Sampling temperature (0.0 = greedy, higher = more random).
    pub temperature: f64,
    /// Request timeout in seconds (None = wait for completion).
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Ollama default endpoint.
            api_url: "http://localhost:11434".to_owned(),
            api_model: "qwen3:4b".to_owned(),
            api_key: String::new(),
            persona: default_persona(),
            max_tokens: 200,
            temperature: 0.7,
            request_timeout_secs: None,
        }
    }
}

fn default_persona() -> String {
    "You are a friendly companion in a group voice chat. \
     Several people may be talking; each line you receive is one person's turn. \
     Reply in one or two short sentences, conversational and warm. \
     Do not use emoji, stage directions, or bullet points."
        .to_owned()
}

/// Speech synthesis configuration (VOICEVOX-compatible engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the synthesis engine.
    pub engine_url: String,
    /// Engine speaker (voice style) id.
    pub speaker: u32,
    /// Speech speed multiplier (0.5–2.0).
    pub speed: f32,
    /// Request timeout in seconds (None = wait for completion).
    pub request_timeout_secs: Option<u64>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine_url: "http://127.0.0.1:50021".to_owned(),
            speaker: 1,
            speed: 1.0,
            request_timeout_secs: None,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum turns retained per text channel (oldest evicted first).
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 40 }
    }
}

/// Returns the default data directory (`~/.local/share/kaiwa` on Linux).
///
/// Override with the `KAIWA_DATA_DIR` environment variable.
fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("KAIWA_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("kaiwa"))
        .unwrap_or_else(|| PathBuf::from("/tmp/kaiwa-data"))
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`~/.config/kaiwa/config.toml`
    /// on Linux).
    ///
    /// Override the directory with the `KAIWA_CONFIG_DIR` environment
    /// variable.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        let dir = if let Some(dir) = std::env::var_os("KAIWA_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .map(|d| d.join("kaiwa"))
                .unwrap_or_else(|| PathBuf::from("/tmp/kaiwa-config"))
        };
        dir.join("config.toml")
    }

    /// Apply `KAIWA_*` environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Env override core with an injectable lookup (tests pass a map).
    pub(crate) fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("KAIWA_SILENCE_THRESHOLD")
            && let Ok(n) = v.parse()
        {
            self.segmenter.silence_rms_threshold = n;
        }
        if let Some(v) = get("KAIWA_SILENCE_DURATION_MS")
            && let Ok(n) = v.parse()
        {
            self.segmenter.silence_duration_ms = n;
        }
        if let Some(v) = get("KAIWA_STT_MODEL") {
            self.stt.model_path = PathBuf::from(v);
        }
        if let Some(v) = get("KAIWA_STT_LANGUAGE") {
            self.stt.language = v;
        }
        if let Some(v) = get("KAIWA_LLM_URL") {
            self.llm.api_url = v;
        }
        if let Some(v) = get("KAIWA_LLM_MODEL") {
            self.llm.api_model = v;
        }
        if let Some(v) = get("KAIWA_LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("KAIWA_TTS_URL") {
            self.tts.engine_url = v;
        }
        if let Some(v) = get("KAIWA_TTS_SPEAKER")
            && let Ok(n) = v.parse()
        {
            self.tts.speaker = n;
        }
        if let Some(v) = get("KAIWA_TTS_SPEED")
            && let Ok(n) = v.parse()
        {
            self.tts.speed = n;
        }
        if let Some(v) = get("KAIWA_HISTORY_MAX_TURNS")
            && let Ok(n) = v.parse()
        {
            self.history.max_turns = n;
        }
    }
}
