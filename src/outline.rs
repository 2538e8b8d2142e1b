use crate::error::{PipelineError, PipelineResult};
use crate::llm::{generate_structured_json, LlmClient};
use crate::model::{Outline, SegmentSpec, Speaker};
use crate::pacing;
use serde::Deserialize;
use std::fmt::Write;

const OUTLINE_SYSTEM_PROMPT: &str =
    "You are an expert educational content creator. Return only valid JSON.";

/// Everything the outline stage needs from the caller. Values here are
/// authoritative; the model's echo of them is never used.
#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub topic: String,
    pub lesson_number: u32,
    pub total_lessons: u32,
    pub user_level: String,
    pub duration_minutes: u32,
    pub speakers: Vec<Speaker>,
    pub source_context: Option<String>,
}

/// Shape contract for the model's outline response. Request-derived fields
/// are absent on purpose; they get filled in during enrichment.
#[derive(Deserialize)]
struct OutlineDraft {
    title: String,
    #[serde(default)]
    summary: String,
    segments: Vec<SegmentSpec>,
    #[serde(default)]
    key_takeaways: Vec<String>,
}

/// Generates a validated, enriched outline for one lesson.
pub async fn generate_outline(
    llm: &dyn LlmClient,
    request: &OutlineRequest,
) -> PipelineResult<Outline> {
    if request.topic.trim().is_empty() {
        return Err(PipelineError::Validation("topic is required".to_string()));
    }

    let num_segments = pacing::segment_count(request.duration_minutes);
    let prompt = build_outline_prompt(request, num_segments);

    let value = generate_structured_json(llm, OUTLINE_SYSTEM_PROMPT, &prompt).await?;
    let draft: OutlineDraft = serde_json::from_value(value)
        .map_err(|e| PipelineError::MalformedOutline(e.to_string()))?;

    if draft.segments.is_empty() {
        return Err(PipelineError::MalformedOutline(
            "outline has no segments".to_string(),
        ));
    }
    if let Some(bad) = draft.segments.iter().find(|s| s.name.trim().is_empty()) {
        return Err(PipelineError::MalformedOutline(format!(
            "segment with empty name: {:?}",
            bad
        )));
    }

    Ok(Outline {
        title: draft.title,
        summary: draft.summary,
        segments: draft.segments,
        key_takeaways: draft.key_takeaways,
        topic: request.topic.clone(),
        lesson_number: request.lesson_number,
        total_lessons: request.total_lessons,
        duration_minutes: request.duration_minutes,
        speakers: request.speakers.clone(),
    })
}

fn build_outline_prompt(request: &OutlineRequest, num_segments: usize) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "Create a detailed outline for an educational audio lesson.\n\n\
         Topic: {}\n\
         Lesson number: {} of {}\n\
         Target duration: {} minutes\n\
         Audience level: {}\n",
        request.topic,
        request.lesson_number,
        request.total_lessons,
        request.duration_minutes,
        request.user_level,
    );

    if let Some(context) = &request.source_context {
        if !context.trim().is_empty() {
            let _ = writeln!(prompt, "Reference material:\n{}\n", context);
        }
    }

    prompt.push_str("Speakers:\n");
    for speaker in &request.speakers {
        let _ = writeln!(
            prompt,
            "- {}: {} Personality: {}",
            speaker.name, speaker.backstory, speaker.personality
        );
    }

    let _ = writeln!(
        prompt,
        "\nCreate exactly {} segments: an engaging introduction that hooks the \
         listener, {} content segments covering the key concepts, and a \
         summary/conclusion that reinforces the takeaways. Each segment states \
         its relative size (short/medium/long).",
        num_segments,
        num_segments.saturating_sub(2),
    );

    let position_note = if request.lesson_number <= 1 {
        "This is the FIRST lesson of the series: introduce the topic broadly and set expectations."
    } else if request.lesson_number >= request.total_lessons {
        "This is the FINAL lesson of the series: wrap up comprehensively."
    } else {
        "Build on previous lessons and introduce new material progressively."
    };
    let _ = writeln!(prompt, "{}", position_note);

    prompt.push_str(
        "\nReturn only a JSON object of this shape:\n\
         {\n\
           \"title\": \"Catchy lesson title\",\n\
           \"summary\": \"2-3 sentence description\",\n\
           \"segments\": [\n\
             {\"name\": \"Segment name\", \"description\": \"What will be covered\", \
              \"size\": \"short|medium|long\", \"key_points\": [\"point 1\", \"point 2\"]}\n\
           ],\n\
           \"key_takeaways\": [\"takeaway 1\", \"takeaway 2\"]\n\
         }\n",
    );

    prompt
}
