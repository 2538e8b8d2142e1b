use crate::error::PipelineResult;
use crate::llm::LlmClient;
use crate::model::{Lesson, LessonSegment, SegmentType};
use crate::outline::{generate_outline, OutlineRequest};
use crate::transcript::generate_segment_transcript;
use log::info;
use std::fmt::Write;

/// Drives the full two-stage pipeline: one outline call, then one transcript
/// call per segment in strictly ascending order. Each segment call receives
/// the accumulated dialogue of every earlier segment as context, so segments
/// can never be generated out of order or in parallel within one lesson.
///
/// Any stage failure aborts the whole lesson; a partial lesson is never
/// returned or persisted.
pub async fn generate_lesson_content(
    llm: &dyn LlmClient,
    request: &OutlineRequest,
) -> PipelineResult<Lesson> {
    info!(
        "Generating lesson: {} ({} min)",
        request.topic, request.duration_minutes
    );

    let outline = generate_outline(llm, request).await?;
    let total = outline.segments.len();
    info!("Outline created: {} ({} segments)", outline.title, total);

    let mut script = String::new();
    let mut full_transcript = Vec::new();
    let mut segments = Vec::with_capacity(total);

    for index in 0..total {
        info!(
            "Generating segment {}/{}: {}",
            index + 1,
            total,
            outline.segments[index].name
        );

        let result = generate_segment_transcript(llm, &outline, index, &script).await?;

        for turn in &result.transcript {
            let _ = write!(script, "\n{}: {}", turn.speaker, turn.dialogue);
        }

        let text = result
            .transcript
            .iter()
            .map(|t| t.dialogue.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        segments.push(LessonSegment {
            segment_type: segment_type(index, total),
            title: result.segment_name.clone(),
            text,
            transcript: result.transcript.clone(),
            duration_estimate: result.duration_estimate_seconds,
            key_points: outline.segments[index].key_points.clone(),
        });

        full_transcript.extend(result.transcript);
    }

    info!(
        "Generated {} dialogue turns across {} segments",
        full_transcript.len(),
        segments.len()
    );

    Ok(Lesson {
        title: outline.title,
        summary: outline.summary,
        topic: outline.topic,
        lesson_number: outline.lesson_number,
        total_lessons: outline.total_lessons,
        duration_minutes: outline.duration_minutes,
        script,
        segments,
        full_transcript,
        key_takeaways: outline.key_takeaways,
        speakers: outline.speakers,
    })
}

/// First segment is the intro, last the summary; a single-segment lesson
/// collapses both roles into plain content.
fn segment_type(index: usize, total: usize) -> SegmentType {
    if total == 1 {
        SegmentType::Content
    } else if index == 0 {
        SegmentType::Intro
    } else if index == total - 1 {
        SegmentType::Summary
    } else {
        SegmentType::Content
    }
}
