//! Drives a story from upstream analysis to rendered, length-bounded chunks:
//! synthesize → draft folder → render service → split → organise.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use engine::draft::{assemble_draft, draft_name, BackgroundAudio, CompositeDraft, DraftSettings, Scale};
use engine::placer::ProbedDurations;
use engine::splitter::{
    placed_boundaries, source_span_boundaries, BoundedSplitter, DialogueBoundary, SplitPlan,
};
use engine::story::{Attachments, RawStory, Story};
use engine::subtitles::SrtFiles;
use engine::timecode::microseconds_to_seconds;
use engine::{OuterSpeed, Synthesis, SynthesizedTimeline, Synthesizer, TrackKind};

use crate::config::{BoundaryMode, StorycutConfig};
use crate::media::MediaTool;
use crate::project::{ChunkRecord, ProjectCache, StoryEntry};
use crate::render::RenderService;

pub const DRAFT_CONTENT_FILE: &str = "draft_content.json";

/// A synthesized story whose draft folder has been written.
#[derive(Debug)]
pub struct StoryDraft {
    pub story: Story,
    pub synthesis: Synthesis,
    pub draft_name: String,
    pub draft_dir: PathBuf,
}

#[derive(Debug)]
pub enum SplitOutcome {
    /// Rendered file is shorter than the minimum chunk length; nothing kept.
    TooShort { duration: f64 },
    /// Rendered file already fits; kept unsplit.
    Whole(ChunkRecord),
    Split {
        plan: SplitPlan,
        chunks: Vec<ChunkRecord>,
    },
}

impl SplitOutcome {
    pub fn chunks(&self) -> Vec<ChunkRecord> {
        match self {
            SplitOutcome::TooShort { .. } => Vec::new(),
            SplitOutcome::Whole(record) => vec![record.clone()],
            SplitOutcome::Split { chunks, .. } => chunks.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryFailure {
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub completed: usize,
    pub chunks: usize,
    pub failures: Vec<StoryFailure>,
}

pub struct Pipeline {
    config: StorycutConfig,
    media: Arc<dyn MediaTool>,
    renderer: Arc<dyn RenderService>,
}

impl Pipeline {
    pub fn new(
        config: StorycutConfig,
        media: Arc<dyn MediaTool>,
        renderer: Arc<dyn RenderService>,
    ) -> Self {
        Pipeline {
            config,
            media,
            renderer,
        }
    }

    pub fn config(&self) -> &StorycutConfig {
        &self.config
    }

    /// Probe every attached voice-over. Unreadable files and files without an
    /// audio stream are left out, so the placer skips their dialogues.
    async fn probe_voice_overs(&self, attachments: &Attachments) -> ProbedDurations {
        let mut probed = ProbedDurations::new();
        for path in attachments.voice_over_paths() {
            match self.media.probe(path).await {
                Ok(info) if info.has_audio => probed.insert(path, info.duration),
                Ok(_) => warn!(path = %path.display(), "voice-over has no audio stream"),
                Err(e) => warn!(path = %path.display(), error = %e, "voice-over probe failed"),
            }
        }
        probed
    }

    /// Parse and synthesize one story against `video_path` without touching disk.
    pub async fn synthesize(&self, raw: RawStory, video_path: &Path) -> Result<(Story, Synthesis)> {
        let (story, attachments) = Story::from_raw(raw)?;
        let probed = self.probe_voice_overs(&attachments).await;

        let synthesizer = Synthesizer::new(
            self.config.placer(),
            self.config.subtitle_config(),
            self.config.normalizer()?,
        );
        let synthesis = synthesizer.synthesize(
            &story,
            &attachments,
            &video_path.to_string_lossy(),
            &probed,
            &SrtFiles,
        )?;
        Ok((story, synthesis))
    }

    async fn draft_settings(&self, video_path: &Path) -> DraftSettings {
        let source_video_duration = match self.media.probe(video_path).await {
            Ok(info) => Some(info.duration),
            Err(e) => {
                warn!(path = %video_path.display(), error = %e, "source video probe failed");
                None
            }
        };

        let background_audio = match &self.config.draft.background_audio {
            Some(path) => match self.media.probe(path).await {
                Ok(info) => Some(BackgroundAudio {
                    path: path.to_string_lossy().into_owned(),
                    duration: info.duration,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "background audio unavailable, skipping");
                    None
                }
            },
            None => None,
        };

        DraftSettings {
            scale: Scale {
                x: self.config.draft.scale_x,
                y: self.config.draft.scale_y,
            },
            source_video_duration,
            background_audio,
        }
    }

    /// Synthesize a story and write its draft folder under the configured
    /// draft output directory.
    pub async fn synthesize_story(
        &self,
        raw: RawStory,
        video_path: &Path,
        name: &str,
    ) -> Result<StoryDraft> {
        let (story, synthesis) = self.synthesize(raw, video_path).await?;
        let settings = self.draft_settings(video_path).await;
        let draft = assemble_draft(&story.title, &synthesis.timeline, &synthesis.speed, &settings);

        let draft_dir = self.config.draft.output_dir.join(name);
        let background = settings.background_audio.as_ref().map(|bg| PathBuf::from(&bg.path));
        write_draft_folder(&draft_dir, &draft, &synthesis.timeline, background.as_deref()).await?;

        info!(
            story = %story.title,
            draft = %draft_dir.display(),
            video_segments = synthesis.timeline.segment_count(TrackKind::Video),
            subtitles = synthesis.timeline.segment_count(TrackKind::Subtitle),
            outer_speed = synthesis.speed.outer_speed.value(),
            final_seconds = engine::timecode::microseconds_to_seconds(synthesis.speed.final_duration),
            "draft written"
        );

        Ok(StoryDraft {
            story,
            synthesis,
            draft_name: name.to_string(),
            draft_dir,
        })
    }

    pub fn boundaries(
        &self,
        story: &Story,
        timeline: Option<&SynthesizedTimeline>,
    ) -> Result<Vec<DialogueBoundary>> {
        match (self.config.split.boundary, timeline) {
            (BoundaryMode::SourceSpan, _) => Ok(source_span_boundaries(story)),
            (BoundaryMode::Placed, Some(timeline)) => Ok(placed_boundaries(story, timeline)),
            (BoundaryMode::Placed, None) => {
                anyhow::bail!("placed split boundaries need a synthesized timeline")
            }
        }
    }

    pub fn plan_split(&self, boundaries: &[DialogueBoundary], outer_speed: OuterSpeed) -> Result<SplitPlan> {
        let splitter = BoundedSplitter::new(self.config.split_bounds()?);
        Ok(splitter.split(boundaries, outer_speed))
    }

    /// Cut a rendered story into chunks whose lengths fall within the split
    /// bounds. Files already within bounds are kept whole.
    pub async fn split_rendered(
        &self,
        rendered: &Path,
        boundaries: &[DialogueBoundary],
        outer_speed: OuterSpeed,
    ) -> Result<SplitOutcome> {
        let bounds = self.config.split_bounds()?;
        let info = self
            .media
            .probe(rendered)
            .await
            .with_context(|| format!("Failed to probe rendered video {}", rendered.display()))?;
        anyhow::ensure!(
            info.has_video,
            "Rendered file {} has no video stream",
            rendered.display()
        );
        let duration = microseconds_to_seconds(info.duration);

        if duration < bounds.min_seconds {
            info!(file = %rendered.display(), duration, "rendered video below minimum length, skipping");
            return Ok(SplitOutcome::TooShort { duration });
        }
        if duration <= bounds.max_seconds {
            info!(file = %rendered.display(), duration, "rendered video within bounds, kept whole");
            return Ok(SplitOutcome::Whole(ChunkRecord {
                segment_index: 1,
                video_path: rendered.to_path_buf(),
                start_time: 0.0,
                end_time: duration,
                duration,
                dialogue_indices: boundaries.iter().map(|b| b.index).collect(),
            }));
        }

        let plan = self.plan_split(boundaries, outer_speed)?;
        if plan.points.is_empty() {
            warn!(file = %rendered.display(), "no split points within bounds");
        }

        let base = rendered
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "story".to_string());
        let output_dir = &self.config.split.output_dir;

        let mut chunks = Vec::with_capacity(plan.points.len());
        for (i, point) in plan.points.iter().enumerate() {
            let number = i + 1;
            let output = output_dir.join(format!("{base}_part{number}.mp4"));
            info!(
                part = number,
                start = point.start_seconds,
                end = point.end_seconds,
                "cutting chunk"
            );
            self.media
                .trim_copy(rendered, point.start_seconds, point.duration(), &output)
                .await?;

            let video_path = if self.config.split.organize_by_source {
                organize_chunk(&output).await?
            } else {
                output
            };
            chunks.push(ChunkRecord {
                segment_index: number,
                video_path,
                start_time: point.start_seconds,
                end_time: point.end_seconds,
                duration: point.duration(),
                dialogue_indices: point.dialogue_indices.clone(),
            });
        }

        Ok(SplitOutcome::Split { plan, chunks })
    }

    async fn process_story(
        &self,
        entry: &mut StoryEntry,
        video_path: &Path,
        video_id: &str,
        story_number: usize,
    ) -> Result<usize> {
        let name = draft_name(video_id, story_number, &entry.story.story_title);
        let drafted = self
            .synthesize_story(entry.story.clone(), video_path, &name)
            .await?;
        let outer_speed = drafted.synthesis.speed.outer_speed;
        entry.draft_path = Some(drafted.draft_dir.clone());
        entry.outer_speed = Some(outer_speed.value());

        let rendered = self
            .renderer
            .export(&drafted.draft_name, &drafted.draft_dir)
            .await?;
        entry.exported_video_path = Some(rendered.clone());

        let boundaries = self.boundaries(&drafted.story, Some(&drafted.synthesis.timeline))?;
        let outcome = self.split_rendered(&rendered, &boundaries, outer_speed).await?;
        let chunks = outcome.chunks();
        let count = chunks.len();
        entry.split_video_segments = Some(chunks);
        Ok(count)
    }

    /// Run every story in the project cache. A failing story is logged and
    /// reported; the others still run. The cache is saved after each story.
    pub async fn run_project(&self, cache_path: &Path) -> Result<RunReport> {
        let mut cache = ProjectCache::load(cache_path)?;
        let mut report = RunReport::default();
        let mut story_number = 0;

        info!(stories = cache.story_count(), cache = %cache_path.display(), "starting project run");
        if cache.story_count() > 0 {
            self.renderer.health_check().await?;
        }

        for segment in 0..cache.segments.len() {
            let video_path = cache.segments[segment].org_video_file_path.clone();
            let video_id = cache.segments[segment].video_id();

            for story in 0..cache.segments[segment].stories.len() {
                story_number += 1;
                let entry = &mut cache.segments[segment].stories[story];
                let title = entry.story.story_title.clone();

                match self
                    .process_story(entry, &video_path, &video_id, story_number)
                    .await
                {
                    Ok(chunks) => {
                        info!(story = %title, chunks, "story finished");
                        report.completed += 1;
                        report.chunks += chunks;
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        error!(story = %title, error = %message, "story failed");
                        report.failures.push(StoryFailure {
                            title,
                            error: message,
                        });
                    }
                }
                cache.save(cache_path)?;
            }
        }

        info!(
            completed = report.completed,
            failed = report.failures.len(),
            chunks = report.chunks,
            "project run finished"
        );
        Ok(report)
    }
}

/// Write `draft_content.json` and copy referenced media into `materials/`.
/// Files already present in `materials/` are kept.
pub async fn write_draft_folder(
    dir: &Path,
    draft: &CompositeDraft,
    timeline: &SynthesizedTimeline,
    background_audio: Option<&Path>,
) -> Result<()> {
    let materials_dir = dir.join("materials");
    tokio::fs::create_dir_all(&materials_dir)
        .await
        .with_context(|| format!("Failed to create {}", materials_dir.display()))?;

    let sources = timeline
        .materials
        .iter()
        .map(|m| PathBuf::from(&m.path))
        .chain(background_audio.map(Path::to_path_buf));

    for source in sources {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = materials_dir.join(file_name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            continue;
        }
        if let Err(e) = tokio::fs::copy(&source, &target).await {
            warn!(source = %source.display(), error = %e, "material not copied");
        }
    }

    let content = serde_json::to_vec_pretty(draft)?;
    let draft_file = dir.join(DRAFT_CONTENT_FILE);
    tokio::fs::write(&draft_file, content)
        .await
        .with_context(|| format!("Failed to write {}", draft_file.display()))?;
    Ok(())
}

/// `<dir>/<video_id>_<rest>` → `<dir>/<video_id>/<rest>`. None when the file
/// name carries no usable prefix.
pub fn organized_path(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;
    let (video_id, rest) = file_name.split_once('_')?;
    if video_id.is_empty() || rest.is_empty() {
        return None;
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    Some(parent.join(video_id).join(rest))
}

/// Move a chunk into its per-source folder, or leave it in place when its
/// name has no source prefix.
pub async fn organize_chunk(path: &Path) -> Result<PathBuf> {
    let Some(target) = organized_path(path) else {
        warn!(file = %path.display(), "chunk name has no source prefix, left in place");
        return Ok(path.to_path_buf());
    };
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(path, &target)
        .await
        .with_context(|| format!("Failed to move {} to {}", path.display(), target.display()))?;
    Ok(target)
}
