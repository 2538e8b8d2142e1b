use crate::error::{PipelineError, PipelineResult};
use crate::llm::{generate_structured_json, LlmClient};
use crate::model::{DialogueTurn, Outline, SegmentResult};
use crate::pacing;
use serde::Deserialize;
use std::fmt::Write;

const TRANSCRIPT_SYSTEM_PROMPT: &str = "You are an expert podcast script writer. \
     Create natural, engaging dialogue. Return only valid JSON.";

/// Continuity context is bounded to this many trailing characters of the
/// accumulated transcript. Dropping older dialogue is deliberate: recency is
/// what keeps the conversation coherent, and the prompt stays bounded.
pub const CONTEXT_WINDOW_CHARS: usize = 2000;

#[derive(Deserialize)]
struct TranscriptDraft {
    transcript: Vec<DialogueTurn>,
}

/// Generates the dialogue for one outline segment, carrying the tail of the
/// previously generated dialogue for continuity.
pub async fn generate_segment_transcript(
    llm: &dyn LlmClient,
    outline: &Outline,
    segment_index: usize,
    previous_transcript: &str,
) -> PipelineResult<SegmentResult> {
    let total = outline.segments.len();
    let segment = outline
        .segments
        .get(segment_index)
        .ok_or(PipelineError::IndexOutOfRange {
            index: segment_index,
            len: total,
        })?;

    let is_final = segment_index == total - 1;
    let min_turns = pacing::min_turns(segment.size);
    let target_seconds = pacing::target_seconds(outline, segment_index);
    let target_words = pacing::target_words(target_seconds);

    let prompt = build_transcript_prompt(
        outline,
        segment_index,
        tail_chars(previous_transcript, CONTEXT_WINDOW_CHARS),
        is_final,
        min_turns,
        target_seconds,
        target_words,
    )?;

    let value = generate_structured_json(llm, TRANSCRIPT_SYSTEM_PROMPT, &prompt).await?;
    let draft: TranscriptDraft = serde_json::from_value(value)
        .map_err(|e| PipelineError::MalformedTranscript(e.to_string()))?;

    if draft.transcript.is_empty() {
        return Err(PipelineError::MalformedTranscript(
            "transcript has no turns".to_string(),
        ));
    }

    Ok(SegmentResult {
        segment_index,
        segment_name: segment.name.clone(),
        segment_size: segment.size,
        transcript: draft.transcript,
        // The pacing target, deliberately not the model's own estimate.
        duration_estimate_seconds: target_seconds,
    })
}

/// Last `max_chars` characters of `s`, respecting char boundaries.
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    s.char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| &s[i..])
        .unwrap_or(s)
}

fn build_transcript_prompt(
    outline: &Outline,
    segment_index: usize,
    previous_transcript: &str,
    is_final: bool,
    min_turns: u32,
    target_seconds: u32,
    target_words: u32,
) -> PipelineResult<String> {
    let segment = &outline.segments[segment_index];
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "Write the next segment of a podcast-style educational lesson.\n\n\
         Lesson: {} (lesson {} of {} on \"{}\")\n",
        outline.title, outline.lesson_number, outline.total_lessons, outline.topic,
    );

    prompt.push_str("Speakers:\n");
    for speaker in &outline.speakers {
        let _ = writeln!(prompt, "- {}: {}", speaker.name, speaker.personality);
    }

    let outline_json = serde_json::to_string_pretty(outline)
        .map_err(|e| PipelineError::Generation(format!("failed to encode outline: {}", e)))?;
    let _ = writeln!(prompt, "\nFull outline:\n{}", outline_json);

    if !previous_transcript.trim().is_empty() {
        let _ = writeln!(
            prompt,
            "\nPrevious dialogue (for continuity):\n{}",
            previous_transcript
        );
    }

    let _ = writeln!(
        prompt,
        "\nCurrent segment to write:\n\
         Name: {}\n\
         Description: {}\n\
         Key points: {}",
        segment.name,
        segment.description,
        segment.key_points.join(", "),
    );

    if is_final {
        prompt.push_str(
            "\nThis is the FINAL segment. Wrap up naturally, thank the listeners, \
             and if more lessons follow in the series, tease what comes next.\n",
        );
    }

    let _ = writeln!(
        prompt,
        "\nGuidelines:\n\
         - Natural conversational dialogue between the speakers above\n\
         - At least {} turns of dialogue\n\
         - Aim for about {} seconds (roughly {} words), within 15%\n\
         - Match each speaker's personality; explain jargon; no re-introductions\n\
         \nReturn only a JSON object:\n\
         {{\"transcript\": [{{\"speaker\": \"Name\", \"dialogue\": \"What they say\"}}]}}",
        min_turns, target_seconds, target_words,
    );

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SegmentSize, SegmentSpec};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct MockLlm {
        response: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl MockLlm {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlm {
        async fn chat(&self, _system: &str, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.response.clone())
        }
    }

    fn outline() -> Outline {
        Outline {
            title: "Owning It".to_string(),
            summary: "s".to_string(),
            segments: vec![
                SegmentSpec {
                    name: "Hook".to_string(),
                    description: "why".to_string(),
                    size: SegmentSize::Short,
                    key_points: vec!["a".to_string()],
                },
                SegmentSpec {
                    name: "Moves".to_string(),
                    description: "how".to_string(),
                    size: SegmentSize::Long,
                    key_points: vec![],
                },
            ],
            key_takeaways: vec![],
            topic: "Rust ownership".to_string(),
            lesson_number: 1,
            total_lessons: 1,
            duration_minutes: 10,
            speakers: vec![],
        }
    }

    const VALID_TRANSCRIPT: &str = r#"{
        "transcript": [
            {"speaker": "Alex", "dialogue": "So what is ownership?"},
            {"speaker": "Sam", "dialogue": "A compile-time contract."}
        ],
        "duration_estimate_seconds": 9999
    }"#;

    #[tokio::test]
    async fn test_index_out_of_range() {
        let llm = MockLlm::new(VALID_TRANSCRIPT);
        let err = generate_segment_transcript(&llm, &outline(), 2, "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IndexOutOfRange { index: 2, len: 2 }
        ));
    }

    #[tokio::test]
    async fn test_duration_estimate_is_pacing_target() {
        let llm = MockLlm::new(VALID_TRANSCRIPT);
        let outline = outline();
        let result = generate_segment_transcript(&llm, &outline, 0, "")
            .await
            .unwrap();

        // 600s / 2 segments = 300s base, short = x0.8. Never the model's 9999.
        assert_eq!(result.duration_estimate_seconds, 240);
        assert_eq!(result.segment_index, 0);
        assert_eq!(result.segment_name, "Hook");
        assert_eq!(result.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_final_segment_gets_wrapup_framing() {
        let llm = MockLlm::new(VALID_TRANSCRIPT);
        let prompts = llm.prompts.clone();
        generate_segment_transcript(&llm, &outline(), 1, "")
            .await
            .unwrap();
        generate_segment_transcript(&llm, &outline(), 0, "")
            .await
            .unwrap();

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("FINAL segment"));
        assert!(!prompts[1].contains("FINAL segment"));
    }

    #[tokio::test]
    async fn test_previous_transcript_truncated_to_window() {
        let llm = MockLlm::new(VALID_TRANSCRIPT);
        let prompts = llm.prompts.clone();

        let old = "OLD-".repeat(600); // 2400 chars, window is 2000
        generate_segment_transcript(&llm, &outline(), 1, &old)
            .await
            .unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(!prompt.contains(&old), "full context must not be embedded");
        assert!(prompt.contains(&old[old.len() - 2000..]));
    }

    #[tokio::test]
    async fn test_pacing_targets_appear_in_prompt() {
        let llm = MockLlm::new(VALID_TRANSCRIPT);
        let prompts = llm.prompts.clone();
        generate_segment_transcript(&llm, &outline(), 1, "")
            .await
            .unwrap();

        // Long segment: 12 turns minimum, 300 * 1.2 = 360s, 900 words.
        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("At least 12 turns"));
        assert!(prompt.contains("about 360 seconds"));
        assert!(prompt.contains("roughly 900 words"));
    }

    #[tokio::test]
    async fn test_missing_transcript_field_is_malformed() {
        let llm = MockLlm::new(r#"{"segment_name": "Hook"}"#);
        let err = generate_segment_transcript(&llm, &outline(), 0, "")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTranscript(_)));
    }

    #[tokio::test]
    async fn test_wrong_shape_transcript_is_malformed() {
        let llm = MockLlm::new(r#"{"transcript": ["just strings"]}"#);
        let err = generate_segment_transcript(&llm, &outline(), 0, "")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTranscript(_)));
    }

    #[test]
    fn test_tail_chars_multibyte_safe() {
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("hello", 3), "llo");
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
    }
}
