use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::materials::MaterialRegistry;
use crate::placer::{DurationProbe, PlacerConfig, SegmentPlacer};
use crate::speed::{GlobalSpeedNormalizer, SpeedPlan};
use crate::story::{Attachments, Story};
use crate::subtitles::{CueSource, SubtitleAligner, SubtitleConfig};
use crate::timecode::microseconds_to_seconds;
use crate::timeline::SynthesizedTimeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub timeline: SynthesizedTimeline,
    pub speed: SpeedPlan,
}

/// Story → placement → subtitles → outer speed. A fresh material registry is
/// used for every story, so repeated calls on the same input are independent.
pub struct Synthesizer {
    placer: SegmentPlacer,
    aligner: SubtitleAligner,
    normalizer: GlobalSpeedNormalizer,
    subtitles_enabled: bool,
}

impl Synthesizer {
    pub fn new(
        placer: PlacerConfig,
        subtitles: Option<SubtitleConfig>,
        normalizer: GlobalSpeedNormalizer,
    ) -> Self {
        Synthesizer {
            placer: SegmentPlacer::new(placer),
            aligner: SubtitleAligner::new(subtitles.unwrap_or_default()),
            normalizer,
            subtitles_enabled: subtitles.is_some(),
        }
    }

    pub fn synthesize(
        &self,
        story: &Story,
        attachments: &Attachments,
        video_path: &str,
        probe: &dyn DurationProbe,
        cues: &dyn CueSource,
    ) -> EngineResult<Synthesis> {
        let mut registry = MaterialRegistry::new();
        let placement = self
            .placer
            .place(story, attachments, video_path, probe, &mut registry)?;

        if placement.placements.is_empty() {
            return Err(EngineError::EmptyStory(story.title.clone()));
        }

        let subtitles = if self.subtitles_enabled {
            self.aligner
                .align(story, attachments, &placement.audio_segments, cues)?
        } else {
            Default::default()
        };

        let speed = self.normalizer.normalize(placement.total_duration);

        info!(
            story = %story.title,
            placed = placement.placements.len(),
            dialogues = story.dialogues.len(),
            video_segments = placement.video_segments.len(),
            subtitle_segments = subtitles.segments.len(),
            nested_seconds = microseconds_to_seconds(placement.total_duration),
            "story synthesized"
        );

        let timeline = SynthesizedTimeline {
            total_duration: placement.total_duration,
            materials: registry.into_materials(),
            video_segments: placement.video_segments,
            audio_segments: placement.audio_segments,
            subtitle_materials: subtitles.materials,
            subtitle_segments: subtitles.segments,
            placements: placement
                .placements
                .into_iter()
                .map(|p| (p.index, p))
                .collect(),
        };

        Ok(Synthesis { timeline, speed })
    }
}
