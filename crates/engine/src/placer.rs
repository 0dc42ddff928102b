//! Places each dialogue's video spans and voice-over on the nested timeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::materials::{MaterialKind, MaterialRegistry};
use crate::story::{Attachments, Dialogue, Story};
use crate::timecode::{microseconds_to_seconds, TimeValue};
use crate::timeline::{new_segment_id, DialoguePlacement, PlacedSegment, TimeRange};

/// Reports the real duration of a voice-over file.
pub trait DurationProbe {
    fn duration(&self, path: &Path) -> EngineResult<TimeValue>;
}

/// Durations measured ahead of synthesis, e.g. by ffprobe.
#[derive(Debug, Clone, Default)]
pub struct ProbedDurations {
    durations: HashMap<PathBuf, TimeValue>,
}

impl ProbedDurations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, duration: TimeValue) {
        self.durations.insert(path.into(), duration);
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }
}

impl DurationProbe for ProbedDurations {
    fn duration(&self, path: &Path) -> EngineResult<TimeValue> {
        self.durations
            .get(path)
            .copied()
            .ok_or_else(|| EngineError::MissingArtifact(path.to_path_buf()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlacerConfig {
    /// Voice-overs shorter than this are logged as suspect. They are still
    /// placed, with the speed computed against their real duration.
    pub audio_epsilon: TimeValue,
    /// Speeds above this are logged. They are never clamped.
    pub speed_warning: Option<f64>,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        PlacerConfig {
            audio_epsilon: 100_000,
            speed_warning: Some(20.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub total_duration: TimeValue,
    pub video_segments: Vec<PlacedSegment>,
    pub audio_segments: Vec<PlacedSegment>,
    pub placements: Vec<DialoguePlacement>,
}

pub struct SegmentPlacer {
    config: PlacerConfig,
}

impl SegmentPlacer {
    pub fn new(config: PlacerConfig) -> Self {
        SegmentPlacer { config }
    }

    /// Walk the story in order with a running cursor. Dialogues without a usable
    /// voice-over or with zero-length spans are skipped with a warning.
    pub fn place(
        &self,
        story: &Story,
        attachments: &Attachments,
        video_path: &str,
        probe: &dyn DurationProbe,
        registry: &mut MaterialRegistry,
    ) -> EngineResult<Placement> {
        let mut placement = Placement::default();
        let mut cursor: TimeValue = 0;

        for dialogue in &story.dialogues {
            let Some(voice_over) = attachments.voice_over(dialogue.index) else {
                warn!(story = %story.title, index = dialogue.index, "no voice-over, dialogue excluded from render");
                continue;
            };

            match self.place_dialogue(dialogue, voice_over, video_path, probe, registry, cursor) {
                Ok((placed, video, audio)) => {
                    cursor = placed.end();
                    placement.video_segments.extend(video);
                    placement.audio_segments.push(audio);
                    placement.placements.push(placed);
                }
                Err(e) if e.is_dialogue_scoped() => {
                    warn!(story = %story.title, index = dialogue.index, error = %e, "dialogue skipped");
                }
                Err(e) => return Err(e),
            }
        }

        placement.total_duration = cursor;
        Ok(placement)
    }

    fn place_dialogue(
        &self,
        dialogue: &Dialogue,
        voice_over: &Path,
        video_path: &str,
        probe: &dyn DurationProbe,
        registry: &mut MaterialRegistry,
        cursor: TimeValue,
    ) -> EngineResult<(DialoguePlacement, Vec<PlacedSegment>, PlacedSegment)> {
        let audio_duration = probe.duration(voice_over)?;
        if audio_duration <= 0 {
            return Err(EngineError::ZeroDuration {
                index: dialogue.index,
                what: "voice-over",
            });
        }

        let total_span = dialogue.total_span_duration();
        if total_span <= 0 {
            return Err(EngineError::ZeroDuration {
                index: dialogue.index,
                what: "video spans",
            });
        }

        // Zero audio was rejected above, so the real duration is a safe divisor and
        // the speed matches the target ranges below: span / speed == target.
        if audio_duration < self.config.audio_epsilon {
            warn!(
                index = dialogue.index,
                audio_micros = audio_duration,
                epsilon_micros = self.config.audio_epsilon,
                "voice-over shorter than epsilon"
            );
        }
        let segment_speed = total_span as f64 / audio_duration as f64;
        if let Some(limit) = self.config.speed_warning {
            if segment_speed > limit {
                warn!(
                    index = dialogue.index,
                    segment_speed,
                    limit,
                    "segment speed above warning threshold; leaving unclamped"
                );
            }
        }

        let video_id = registry.register(MaterialKind::Video, video_path);
        let audio_id = registry.register(MaterialKind::Audio, &voice_over.to_string_lossy());

        // Span boundaries are mapped proportionally so the pieces sum to the audio
        // duration exactly, whatever the rounding of each piece.
        let mut video = Vec::with_capacity(dialogue.video_spans.len());
        let mut consumed: TimeValue = 0;
        let mut previous_end = cursor;
        for span in &dialogue.video_spans {
            consumed += span.duration();
            let end = cursor + scale(audio_duration, consumed, total_span);
            video.push(PlacedSegment {
                id: new_segment_id(),
                dialogue_index: dialogue.index,
                material_id: video_id.clone(),
                source_range: TimeRange::new(span.start, span.duration()),
                target_range: TimeRange::new(previous_end, end - previous_end),
                speed: segment_speed,
                volume: 0.0,
            });
            previous_end = end;
        }

        let audio = PlacedSegment {
            id: new_segment_id(),
            dialogue_index: dialogue.index,
            material_id: audio_id,
            source_range: TimeRange::new(0, audio_duration),
            target_range: TimeRange::new(cursor, audio_duration),
            speed: 1.0,
            volume: 1.0,
        };

        debug!(
            index = dialogue.index,
            start_seconds = microseconds_to_seconds(cursor),
            audio_seconds = microseconds_to_seconds(audio_duration),
            spans = dialogue.video_spans.len(),
            segment_speed,
            "placed dialogue"
        );

        Ok((
            DialoguePlacement {
                index: dialogue.index,
                start: cursor,
                audio_duration,
                segment_speed,
            },
            video,
            audio,
        ))
    }
}

/// `value * numerator / denominator`, rounded to the nearest microsecond.
fn scale(value: TimeValue, numerator: TimeValue, denominator: TimeValue) -> TimeValue {
    let product = value as i128 * numerator as i128;
    let denominator = denominator as i128;
    ((product + denominator / 2) / denominator) as TimeValue
}
