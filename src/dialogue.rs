use crate::audio;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{DialogueTurn, VoiceParams};
use crate::speech::SpeechClient;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the fallback voice profile used for unrecognized speakers.
pub const DEFAULT_PROFILE: &str = "default";

/// Length of the silent artifact returned for an empty transcript.
const EMPTY_TRANSCRIPT_SILENCE_MS: u32 = 1000;

/// Converts a dialogue turn sequence into one concatenated WAV artifact:
/// one synthesis call per non-blank turn, a fixed silence gap between
/// consecutive clips, never after the last.
///
/// This stage knows nothing about segments or lessons, so it serves both
/// full-lesson and single-segment synthesis requests.
pub struct DialogueSynthesizer {
    speech: Arc<dyn SpeechClient>,
    turn_gap_ms: u32,
}

impl DialogueSynthesizer {
    pub fn new(speech: Arc<dyn SpeechClient>, turn_gap_ms: u32) -> Self {
        Self { speech, turn_gap_ms }
    }

    pub async fn synthesize_dialogue(
        &self,
        transcript: &[DialogueTurn],
        voice_profiles: &HashMap<String, VoiceParams>,
    ) -> PipelineResult<Vec<u8>> {
        let fallback = VoiceParams::new();
        let mut clips: Vec<Vec<u8>> = Vec::new();

        for turn in transcript {
            let text = turn.dialogue.trim();
            if text.is_empty() {
                continue;
            }

            let voice = match voice_profiles.get(&turn.speaker) {
                Some(params) => params,
                None => {
                    // Unknown speakers never abort synthesis.
                    warn!(
                        "No voice profile for speaker '{}', using {}",
                        turn.speaker, DEFAULT_PROFILE
                    );
                    voice_profiles.get(DEFAULT_PROFILE).unwrap_or(&fallback)
                }
            };

            debug!("Synthesizing turn for {}: {:.40}...", turn.speaker, text);
            let clip = self.speech.synthesize(text, voice).await?;

            if !clips.is_empty() {
                let first = audio::scan_wav(&clips[0])
                    .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
                let gap = audio::silence_matching(&first.fmt, self.turn_gap_ms)
                    .map_err(|e| PipelineError::Synthesis(e.to_string()))?;
                clips.push(gap);
            }
            clips.push(clip);
        }

        if clips.is_empty() {
            // Empty input is a valid, defined case.
            return Ok(audio::silence_default(EMPTY_TRANSCRIPT_SILENCE_MS));
        }

        audio::concat_wavs(&clips).map_err(|e| PipelineError::Synthesis(e.to_string()))
    }
}
