use crate::model::{Speaker, VoiceParams};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    /// Optional persistence backend; without it, audio is returned inline.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default = "default_speakers")]
    pub speakers: Vec<Speaker>,
    #[serde(default = "default_voice_profiles")]
    pub voice_profiles: HashMap<String, VoiceParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "gemini".
    pub provider: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub base_url: String,
    #[serde(default = "default_tts_timeout")]
    pub timeout_seconds: u64,
    /// Silence inserted between consecutive dialogue turns.
    #[serde(default = "default_turn_gap_ms")]
    pub turn_gap_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_tts_timeout() -> u64 {
    600
}

fn default_turn_gap_ms() -> u32 {
    300
}

fn default_bucket() -> String {
    "lesson-audio".to_string()
}

fn voice(exaggeration: f64, cfg_weight: f64) -> VoiceParams {
    let mut params = VoiceParams::new();
    params.insert("exaggeration".to_string(), exaggeration);
    params.insert("cfg_weight".to_string(), cfg_weight);
    params
}

/// The stock two-host roster used when the config file does not define one.
fn default_speakers() -> Vec<Speaker> {
    vec![
        Speaker {
            name: "Alex".to_string(),
            backstory: "A curious lifelong learner who asks the questions the \
                        listener is thinking."
                .to_string(),
            personality: "Enthusiastic, inquisitive, occasionally plays devil's advocate."
                .to_string(),
            voice_params: voice(0.6, 0.5),
        },
        Speaker {
            name: "Sam".to_string(),
            backstory: "An experienced educator who explains complex ideas with \
                        concrete examples."
                .to_string(),
            personality: "Patient, precise, warm.".to_string(),
            voice_params: voice(0.4, 0.6),
        },
    ]
}

fn default_voice_profiles() -> HashMap<String, VoiceParams> {
    let mut profiles = HashMap::new();
    for speaker in default_speakers() {
        profiles.insert(speaker.name.clone(), speaker.voice_params);
    }
    profiles.insert(crate::dialogue::DEFAULT_PROFILE.to_string(), voice(0.5, 0.5));
    profiles
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Per-speaker voice parameters, with explicit `voice_profiles` entries
    /// taking precedence over the roster's inline parameters.
    pub fn effective_voice_profiles(&self) -> HashMap<String, VoiceParams> {
        let mut profiles: HashMap<String, VoiceParams> = self
            .speakers
            .iter()
            .map(|s| (s.name.clone(), s.voice_params.clone()))
            .collect();
        for (name, params) in &self.voice_profiles {
            profiles.insert(name.clone(), params.clone());
        }
        profiles
    }
}
