use crate::config::TtsConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::model::VoiceParams;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Waveform synthesis capability: one call per piece of text, returning a
/// complete WAV buffer.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> PipelineResult<Vec<u8>>;
}

pub fn create_speech_client(config: &TtsConfig) -> Result<Box<dyn SpeechClient>> {
    Ok(Box::new(ChatterboxClient::new(
        &config.base_url,
        Duration::from_secs(config.timeout_seconds),
    )?))
}

/// Client for a chatterbox-style synthesis server: POST /synthesize with the
/// text and the per-speaker voice parameters, WAV bytes back.
pub struct ChatterboxClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(flatten)]
    voice: &'a VoiceParams,
}

impl ChatterboxClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl SpeechClient for ChatterboxClient {
    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> PipelineResult<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(PipelineError::Synthesis(
                "cannot synthesize empty text".to_string(),
            ));
        }

        let url = format!("{}/synthesize", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&SynthesizeRequest { text, voice })
            .send()
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Synthesis(format!(
                "synthesis server returned {}: {}",
                status, body
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
