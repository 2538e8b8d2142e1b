use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Synthesis knobs passed through to the speech backend, e.g.
/// `{"exaggeration": 0.5, "cfg_weight": 0.5}`.
pub type VoiceParams = BTreeMap<String, f64>;

/// One voice in the lesson's roster. Immutable once a generation run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub backstory: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub voice_params: VoiceParams,
}

/// Relative segment weight. Drives the duration and turn-count multipliers.
///
/// Anything the model returns outside {short, medium, long} is coerced to
/// `Medium` rather than failing the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentSize {
    Short,
    #[default]
    Medium,
    Long,
}

impl SegmentSize {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => SegmentSize::Short,
            "long" => SegmentSize::Long,
            _ => SegmentSize::Medium,
        }
    }
}

impl<'de> Deserialize<'de> for SegmentSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SegmentSize::parse(&s))
    }
}

/// One planned segment in an outline, as returned by the outline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub size: SegmentSize,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Structured lesson outline. Created once per lesson; the request-derived
/// fields (topic, numbering, duration, speakers) are filled in by the
/// outline generator, never taken from the model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub segments: Vec<SegmentSpec>,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    pub topic: String,
    pub lesson_number: u32,
    pub total_lessons: u32,
    pub duration_minutes: u32,
    pub speakers: Vec<Speaker>,
}

/// A single line of dialogue attributed to a speaker name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: String,
    pub dialogue: String,
}

/// Output of one segment-transcript generation call.
///
/// `duration_estimate_seconds` is the pacing target, not a measured length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segment_index: usize,
    pub segment_name: String,
    pub segment_size: SegmentSize,
    pub transcript: Vec<DialogueTurn>,
    pub duration_estimate_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Intro,
    Content,
    Summary,
}

/// Segment record inside an assembled lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub title: String,
    /// Joined dialogue text of the segment, for single-voice TTS.
    pub text: String,
    pub transcript: Vec<DialogueTurn>,
    pub duration_estimate: u32,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Fully assembled lesson document. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    pub summary: String,
    pub topic: String,
    pub lesson_number: u32,
    pub total_lessons: u32,
    /// The originally requested duration, not a recomputed actual length.
    pub duration_minutes: u32,
    /// Ordered join of every turn as "\n{speaker}: {dialogue}" lines.
    pub script: String,
    pub segments: Vec<LessonSegment>,
    pub full_transcript: Vec<DialogueTurn>,
    pub key_takeaways: Vec<String>,
    pub speakers: Vec<Speaker>,
}

/// Persisted episode row. `audio_path` flips from absent to present once;
/// regeneration overwrites the same object rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub audio_path: Option<String>,
}

impl Episode {
    pub fn has_audio(&self) -> bool {
        self.audio_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Lesson-plan status. The pipeline only ever moves pending -> completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Pending,
    Completed,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Pending => "pending",
            LessonStatus::Completed => "completed",
        }
    }
}
