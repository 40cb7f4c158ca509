//! Bot configuration
//!
//! [`BotConfig`] is the YAML file the console loads at startup. Every section
//! carries `#[serde(default)]`, so a file only needs the keys it changes.
//! [`BotConfig::turn_config`] flattens it into the per-turn [`TurnConfig`]
//! that is passed explicitly to `SpeechPipeline::run_turn`.
//!
//! ```yaml
//! llm:
//!   backend: gemini
//!   generation:
//!     model: gemini-1.5-flash
//!     temperature: 0.9
//! tts:
//!   voice:
//!     speaker_id: 3
//! speech:
//!   filler:
//!     enabled: true
//! ```

use crate::segmenter::SegmenterConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete bot configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub llm: LlmSettings,
    pub tts: TtsSettings,
    pub speech: SpeechSettings,
    pub audio: AudioSettings,
    pub prompts: PromptSettings,
}

impl BotConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: BotConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Validate value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.llm.generation.model.trim().is_empty() {
            return Err(Error::Config("llm.generation.model cannot be empty".to_string()));
        }

        if let Some(t) = self.llm.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::Config(format!(
                    "llm.generation.temperature out of range: {} (expected 0.0..=2.0)",
                    t
                )));
            }
        }

        if let Some(p) = self.llm.generation.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!(
                    "llm.generation.top_p out of range: {} (expected 0.0..=1.0)",
                    p
                )));
            }
        }

        let voice = &self.tts.voice;
        if voice.speed_scale <= 0.0 {
            return Err(Error::Config(format!(
                "tts.voice.speed_scale must be positive, got {}",
                voice.speed_scale
            )));
        }
        if voice.volume_scale < 0.0 {
            return Err(Error::Config(format!(
                "tts.voice.volume_scale cannot be negative, got {}",
                voice.volume_scale
            )));
        }

        let speech = &self.speech;
        if speech.poll_interval_ms == 0 {
            return Err(Error::Config("speech.poll_interval_ms must be at least 1".to_string()));
        }
        if speech.max_pending_jobs == 0 {
            return Err(Error::Config("speech.max_pending_jobs must be at least 1".to_string()));
        }
        if let Some(p) = speech.filler.probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!(
                    "speech.filler.probability out of range: {} (expected 0.0..=1.0)",
                    p
                )));
            }
        }

        if self.audio.player.trim().is_empty() {
            return Err(Error::Config("audio.player cannot be empty".to_string()));
        }
        if self.audio.fade_secs < 0.0 {
            return Err(Error::Config(format!(
                "audio.fade_secs cannot be negative, got {}",
                self.audio.fade_secs
            )));
        }

        Ok(())
    }

    /// Per-turn settings derived from this file
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            llm: self.llm.generation.clone(),
            voice: self.tts.enabled.then(|| self.tts.voice.clone()),
            segmenter: self.speech.segmenter.clone(),
            poll_interval: Duration::from_millis(self.speech.poll_interval_ms),
            synthesis_lookahead: self.speech.synthesis_lookahead,
            max_pending_jobs: self.speech.max_pending_jobs,
            filler: self.speech.filler.clone(),
        }
    }
}

/// LLM backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    OpenAi,
    Gemini,
}

/// LLM backend selection and connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub backend: LlmBackend,

    /// Override the backend's base URL (proxies, local compatible servers)
    pub base_url: Option<String>,

    /// Environment variable holding the API key; backend default when unset
    pub api_key_env: Option<String>,

    /// Bound on connecting and on waiting for the response head; a reply
    /// that is already streaming may run longer
    pub request_timeout_secs: u64,

    pub generation: LlmConfig,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: LlmBackend::OpenAi,
            base_url: None,
            api_key_env: None,
            request_timeout_secs: 120,
            generation: LlmConfig::default(),
        }
    }
}

/// Generation parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
        }
    }
}

/// TTS backend kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    #[default]
    Voicevox,
}

/// TTS backend selection and default voice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub backend: TtsBackend,

    /// Speak replies; `false` runs every turn text-only
    pub enabled: bool,

    pub endpoint: String,

    pub request_timeout_secs: u64,

    pub voice: VoiceConfig,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Voicevox,
            enabled: true,
            endpoint: "http://127.0.0.1:50021".to_string(),
            request_timeout_secs: 30,
            voice: VoiceConfig::default(),
        }
    }
}

/// Voice parameters for synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub speaker_id: u32,
    pub speed_scale: f32,
    pub volume_scale: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            speaker_id: 46,
            speed_scale: 1.2,
            volume_scale: 0.4,
        }
    }
}

/// Pipeline pacing and segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub segmenter: SegmenterConfig,

    /// Drain poll period in milliseconds
    pub poll_interval_ms: u64,

    /// Jobs whose synthesis may run ahead of the playing job
    pub synthesis_lookahead: usize,

    /// Unfinished jobs allowed before generation waits for playback
    pub max_pending_jobs: usize,

    pub filler: FillerConfig,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            poll_interval_ms: 100,
            synthesis_lookahead: 1,
            max_pending_jobs: 8,
            filler: FillerConfig::default(),
        }
    }
}

/// Pre-recorded filler played while the first sentence is synthesized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    pub enabled: bool,

    /// Directory holding `<word>.wav` clips
    pub dir: PathBuf,

    pub words: Vec<String>,

    /// Chance of playing a filler; `n / (n + 1)` for `n` words when unset
    pub probability: Option<f64>,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("sound_files/filler"),
            words: ["あー", "ふむ", "ほう", "なるほど", "うむ"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            probability: None,
        }
    }
}

impl FillerConfig {
    pub fn effective_probability(&self) -> f64 {
        match self.probability {
            Some(p) => p.clamp(0.0, 1.0),
            None => {
                let n = self.words.len() as f64;
                n / (n + 1.0)
            }
        }
    }

    pub fn clip_path(&self, word: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", word))
    }
}

/// External player and temp audio handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub player: String,
    pub player_args: Vec<String>,

    /// Linear fade-in/out length applied to synthesized clips (0 disables)
    pub fade_secs: f32,

    /// Directory for synthesized clips; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            player: "aplay".to_string(),
            player_args: vec!["-q".to_string()],
            fade_secs: 0.1,
            temp_dir: None,
        }
    }
}

/// Prompt files and conversation history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// YAML list of system messages
    pub system: Option<PathBuf>,

    /// YAML list of character messages appended after the system prompt
    pub character: Option<PathBuf>,

    /// JSON-lines history replayed into every prompt
    pub history_log: Option<PathBuf>,

    /// Most recent history messages replayed (all when unset)
    pub history_limit: Option<usize>,
}

/// Settings for one chat turn
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub llm: LlmConfig,

    /// `None` runs the turn text-only
    pub voice: Option<VoiceConfig>,

    pub segmenter: SegmenterConfig,
    pub poll_interval: Duration,
    pub synthesis_lookahead: usize,
    pub max_pending_jobs: usize,
    pub filler: FillerConfig,
}

impl Default for TurnConfig {
    fn default() -> Self {
        BotConfig::default().turn_config()
    }
}

impl TurnConfig {
    pub fn text_only(mut self) -> Self {
        self.voice = None;
        self
    }

    pub fn is_text_only(&self) -> bool {
        self.voice.is_none()
    }
}
