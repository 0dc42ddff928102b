use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::materials::{Material, MaterialId};
pub use crate::timecode::{TimeValue, MICROS_PER_SECOND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeValue,
    pub duration: TimeValue,
}

impl TimeRange {
    pub fn new(start: TimeValue, duration: TimeValue) -> Self {
        TimeRange { start, duration }
    }

    pub fn end(&self) -> TimeValue {
        self.start + self.duration
    }
}

pub(crate) fn new_segment_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// One clip on the nested timeline. `source_range` is the raw cut; `speed` is
/// carried separately and never baked into either range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedSegment {
    pub id: String,
    pub dialogue_index: u32,
    pub material_id: MaterialId,
    pub source_range: TimeRange,
    pub target_range: TimeRange,
    pub speed: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleMaterial {
    pub id: MaterialId,
    pub text: String,
    /// Character range the text style covers, always `[0, text length]`.
    pub style_range: [usize; 2],
}

impl SubtitleMaterial {
    pub fn new(text: String) -> Self {
        let len = text.chars().count();
        SubtitleMaterial {
            id: MaterialId::generate(),
            text,
            style_range: [0, len],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub id: String,
    pub dialogue_index: u32,
    pub material_id: MaterialId,
    pub source_range: TimeRange,
    pub target_range: TimeRange,
}

/// Where a dialogue landed on the nested timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DialoguePlacement {
    pub index: u32,
    /// Target start shared by the dialogue's first video segment and its audio.
    pub start: TimeValue,
    pub audio_duration: TimeValue,
    /// Inner, per-dialogue speed applied to every video span of the dialogue.
    pub segment_speed: f64,
}

impl DialoguePlacement {
    pub fn end(&self) -> TimeValue {
        self.start + self.audio_duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

/// The nested timeline built from one story, before the outer speed layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesizedTimeline {
    pub total_duration: TimeValue,
    pub materials: Vec<Material>,
    pub video_segments: Vec<PlacedSegment>,
    pub audio_segments: Vec<PlacedSegment>,
    pub subtitle_materials: Vec<SubtitleMaterial>,
    pub subtitle_segments: Vec<SubtitleSegment>,
    /// Keyed by dialogue index; only dialogues that were placed appear.
    pub placements: BTreeMap<u32, DialoguePlacement>,
}

impl SynthesizedTimeline {
    pub fn placement(&self, index: u32) -> Option<&DialoguePlacement> {
        self.placements.get(&index)
    }

    pub fn video_segments_for(&self, index: u32) -> impl Iterator<Item = &PlacedSegment> {
        self.video_segments
            .iter()
            .filter(move |s| s.dialogue_index == index)
    }

    pub fn segment_count(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Video => self.video_segments.len(),
            TrackKind::Audio => self.audio_segments.len(),
            TrackKind::Subtitle => self.subtitle_segments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_material_style_range_counts_characters() {
        let material = SubtitleMaterial::new("Hello world".to_string());
        assert_eq!(material.style_range, [0, 11]);
        let wide = SubtitleMaterial::new("你好".to_string());
        assert_eq!(wide.style_range, [0, 2]);
    }

    #[test]
    fn time_range_end() {
        assert_eq!(TimeRange::new(1_000_000, 500_000).end(), 1_500_000);
    }
}
