//! Settings and per-model persisted defaults.
//!
//! `Settings` is the host-facing configuration surface (what the add-on's
//! settings panel reads and writes); `SessionDefaults` is the small JSON
//! document remembering the last max-tokens/temperature per model and,
//! optionally, the last system prompt, loaded when a session opens and
//! flushed when it closes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TOP_P_MIN: f64 = 0.0;
pub const TOP_P_MAX: f64 = 1.0;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an accessibility assistant integrated with a screen reader. \
     Answer concisely and describe visual content in detail when asked.";

pub const DEFAULT_IMAGE_PROMPT: &str = "Describe the images in as much detail as possible.";

/// Transcription output formats accepted by the speech-to-text endpoint.
pub const AUDIO_RESPONSE_FORMATS: [&str; 3] = ["json", "srt", "vtt"];

fn default_true() -> bool {
    true
}

/// Per-earcon and per-channel feedback toggles for chat events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSettings {
    #[serde(default = "default_true")]
    pub sound_request_sent: bool,
    #[serde(default = "default_true")]
    pub sound_response_pending: bool,
    #[serde(default = "default_true")]
    pub sound_response_received: bool,
    #[serde(default = "default_true")]
    pub sound_progress: bool,
    #[serde(default = "default_true")]
    pub sound_record: bool,
    /// Speak streamed response text as it arrives.
    #[serde(default = "default_true")]
    pub speech_response_received: bool,
    /// Move the braille cursor to the transcript when a response starts.
    #[serde(default = "default_true")]
    pub braille_auto_focus: bool,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            sound_request_sent: true,
            sound_response_pending: true,
            sound_response_received: true,
            sound_progress: true,
            sound_record: true,
            speech_response_received: true,
            braille_auto_focus: true,
        }
    }
}

/// Image pre-submission policy. Resizing lowers request sizes and costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_true")]
    pub resize: bool,
    #[serde(default = "ImageSettings::default_max_width")]
    pub max_width: u32,
    #[serde(default = "ImageSettings::default_max_height")]
    pub max_height: u32,
    #[serde(default = "ImageSettings::default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub use_custom_prompt: bool,
    #[serde(default)]
    pub custom_prompt_text: String,
}

impl ImageSettings {
    fn default_max_width() -> u32 {
        1024
    }
    fn default_max_height() -> u32 {
        1024
    }
    fn default_quality() -> u8 {
        85
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            resize: true,
            max_width: Self::default_max_width(),
            max_height: Self::default_max_height(),
            quality: Self::default_quality(),
            use_custom_prompt: false,
            custom_prompt_text: String::new(),
        }
    }
}

/// Host-facing configuration for the add-on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Include prior turns as context when building requests.
    #[serde(default = "default_true")]
    pub conversation_mode: bool,
    /// Request incremental responses instead of a single completion object.
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Expose temperature/top_p/response-format controls.
    #[serde(default)]
    pub advanced_mode: bool,
    /// Remember the last system prompt across sessions.
    #[serde(default = "default_true")]
    pub save_system: bool,
    /// Enable JSON trace logging.
    #[serde(default)]
    pub logs: bool,
    /// Allow prompt/response snippets in the trace log.
    #[serde(default)]
    pub log_content: bool,
    #[serde(default = "Settings::default_model")]
    pub default_model: String,
    #[serde(default = "Settings::default_vision_model")]
    pub default_vision_model: String,
    #[serde(default = "Settings::default_top_p")]
    pub top_p: f64,
    #[serde(default = "Settings::default_tts_voice")]
    pub tts_voice: String,
    #[serde(default = "Settings::default_tts_model")]
    pub tts_model: String,
    #[serde(default = "Settings::default_sample_rate")]
    pub record_sample_rate: u32,
    /// Hard cap on a single microphone capture, in seconds.
    #[serde(default = "Settings::default_max_record_secs")]
    pub max_record_secs: u64,
    #[serde(default = "Settings::default_audio_response_format")]
    pub audio_response_format: String,
    #[serde(default)]
    pub feedback: FeedbackSettings,
    #[serde(default)]
    pub images: ImageSettings,
}

pub const TTS_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];
pub const TTS_MODELS: [&str; 2] = ["tts-1", "tts-1-hd"];

impl Settings {
    fn default_model() -> String {
        "gpt-3.5-turbo".into()
    }
    fn default_vision_model() -> String {
        "gpt-4o".into()
    }
    fn default_top_p() -> f64 {
        1.0
    }
    fn default_tts_voice() -> String {
        "nova".into()
    }
    fn default_tts_model() -> String {
        "tts-1".into()
    }
    fn default_sample_rate() -> u32 {
        16_000
    }
    fn default_max_record_secs() -> u64 {
        600
    }
    fn default_audio_response_format() -> String {
        "json".into()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings from {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write settings to {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(TOP_P_MIN..=TOP_P_MAX).contains(&self.top_p) {
            bail!(
                "top_p {} outside [{TOP_P_MIN}, {TOP_P_MAX}]",
                self.top_p
            );
        }
        if self.images.quality == 0 || self.images.quality > 100 {
            bail!("image quality {} outside 1..=100", self.images.quality);
        }
        if self.images.resize && self.images.max_width == 0 && self.images.max_height == 0 {
            bail!("image resize enabled but both max dimensions are zero");
        }
        if self.record_sample_rate == 0 {
            bail!("record sample rate must be positive");
        }
        if self.max_record_secs == 0 {
            bail!("max record duration must be positive");
        }
        if !AUDIO_RESPONSE_FORMATS.contains(&self.audio_response_format.as_str()) {
            bail!(
                "unknown audio response format '{}'",
                self.audio_response_format
            );
        }
        if !TTS_VOICES.contains(&self.tts_voice.as_str()) {
            bail!("unknown TTS voice '{}'", self.tts_voice);
        }
        if !TTS_MODELS.contains(&self.tts_model.as_str()) {
            bail!("unknown TTS model '{}'", self.tts_model);
        }
        Ok(())
    }

    /// Destination for the JSON trace log, if logging is enabled. The
    /// `VOXCHAT_TRACE_LOG` environment variable overrides the default
    /// location under the system temp directory.
    pub fn trace_log(&self) -> Option<PathBuf> {
        if !self.logs {
            return None;
        }
        let path = std::env::var("VOXCHAT_TRACE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("voxchat_trace.jsonl"));
        Some(path)
    }

    /// Prompt inserted when the user attaches images to an empty prompt field.
    pub fn image_description_prompt(&self) -> &str {
        if self.images.use_custom_prompt && !self.images.custom_prompt_text.trim().is_empty() {
            &self.images.custom_prompt_text
        } else {
            DEFAULT_IMAGE_PROMPT
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conversation_mode: true,
            stream: true,
            advanced_mode: false,
            save_system: true,
            logs: false,
            log_content: false,
            default_model: Self::default_model(),
            default_vision_model: Self::default_vision_model(),
            top_p: Self::default_top_p(),
            tts_voice: Self::default_tts_voice(),
            tts_model: Self::default_tts_model(),
            record_sample_rate: Self::default_sample_rate(),
            max_record_secs: Self::default_max_record_secs(),
            audio_response_format: Self::default_audio_response_format(),
            feedback: FeedbackSettings::default(),
            images: ImageSettings::default(),
        }
    }
}

/// Last-used request parameters remembered per model id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// The per-user JSON document persisted across sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefaults>,
    /// Last system prompt, kept only while `Settings::save_system` is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl SessionDefaults {
    /// Missing or corrupt files yield empty defaults rather than an error;
    /// losing remembered parameters is not worth blocking a session open.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(defaults) => defaults,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring corrupt defaults file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(self)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write defaults to {}", path.display()))
    }

    pub fn max_tokens(&self, model_id: &str) -> Option<u32> {
        self.models.get(model_id).and_then(|d| d.max_tokens)
    }

    pub fn temperature(&self, model_id: &str) -> Option<f64> {
        self.models.get(model_id).and_then(|d| d.temperature)
    }

    pub fn set_max_tokens(&mut self, model_id: &str, value: u32) {
        self.models.entry(model_id.to_string()).or_default().max_tokens = Some(value);
    }

    pub fn set_temperature(&mut self, model_id: &str, value: f64) {
        self.models.entry(model_id.to_string()).or_default().temperature = Some(value);
    }
}

/// Directory holding the defaults file, credential files, and temp audio.
pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxchat")
}
