use crate::model::{Outline, SegmentSize};

/// No segment is targeted below this, even for very short lessons.
pub const FLOOR_SECONDS: u32 = 45;
/// Conversational speaking rate used to translate seconds into words.
pub const WORDS_PER_MINUTE: u32 = 150;
/// Keeps short segments substantive.
pub const MIN_TARGET_WORDS: u32 = 300;
/// Baseline dialogue turns per segment before the size multiplier.
pub const BASE_TURNS: u32 = 4;

impl SegmentSize {
    pub fn duration_multiplier(&self) -> f64 {
        match self {
            SegmentSize::Short => 0.8,
            SegmentSize::Medium => 1.0,
            SegmentSize::Long => 1.2,
        }
    }

    pub fn turns_multiplier(&self) -> u32 {
        match self {
            SegmentSize::Short => 1,
            SegmentSize::Medium => 2,
            SegmentSize::Long => 3,
        }
    }
}

/// Number of segments for a requested duration: a monotonic step function
/// clamped to [3, 10]. Three is the floor so every lesson keeps an intro,
/// at least one content segment and a summary.
pub fn segment_count(duration_minutes: u32) -> usize {
    match duration_minutes {
        0..=5 => 3,
        6..=8 => 4,
        9..=10 => 5,
        11..=15 => 6,
        16..=20 => 7,
        d => ((d / 2) as usize).min(10),
    }
}

/// Per-segment duration target: the lesson budget split evenly across
/// segments (with the floor applied), weighted by the segment's size.
pub fn target_seconds(outline: &Outline, segment_index: usize) -> u32 {
    let count = outline.segments.len().max(1) as u32;
    let base = (outline.duration_minutes * 60 / count).max(FLOOR_SECONDS);
    let size = outline
        .segments
        .get(segment_index)
        .map(|s| s.size)
        .unwrap_or_default();
    (base as f64 * size.duration_multiplier()) as u32
}

pub fn target_words(target_seconds: u32) -> u32 {
    (target_seconds * WORDS_PER_MINUTE / 60).max(MIN_TARGET_WORDS)
}

pub fn min_turns(size: SegmentSize) -> u32 {
    BASE_TURNS * size.turns_multiplier()
}
