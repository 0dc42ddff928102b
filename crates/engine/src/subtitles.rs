//! Word/phrase-level subtitle cues and their re-hosting onto the nested timeline.
//!
//! Cues are timed against a dialogue's own voice-over, so each one is shifted by
//! the target start of that dialogue's audio segment, never the video cursor.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::story::{Attachments, Story};
use crate::timecode::{parse_subtitle_time, TimeValue};
use crate::timeline::{new_segment_id, PlacedSegment, SubtitleMaterial, SubtitleSegment, TimeRange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start: TimeValue,
    pub end: TimeValue,
    pub text: String,
}

/// Parse SRT content: blocks of index line, `start --> end` line and text lines,
/// separated by blank (or whitespace-only) lines. Blocks without a timing line
/// are ignored.
pub fn parse_srt(content: &str) -> EngineResult<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    for lines in srt_blocks(content) {
        if lines.len() < 3 {
            continue;
        }
        let Some((start, end)) = lines[1].split_once("-->") else {
            continue;
        };
        cues.push(SubtitleCue {
            start: parse_subtitle_time(start)?,
            end: parse_subtitle_time(end)?,
            text: lines[2..].join("\n").trim().to_string(),
        });
    }
    Ok(cues)
}

fn srt_blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    // lines() also strips a trailing \r
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Strip punctuation, collapse whitespace runs to one space and trim.
pub fn clean_cue_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !is_cue_punctuation(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_cue_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '，' | '。' | '！' | '？' | '；' | '：' | '、' | '“' | '”' | '‘' | '’' | '（' | '）' | '…'
        )
}

/// Loads the cues for one dialogue.
pub trait CueSource {
    fn load(&self, path: &Path) -> EngineResult<Vec<SubtitleCue>>;
}

/// Reads SRT files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrtFiles;

impl CueSource for SrtFiles {
    fn load(&self, path: &Path) -> EngineResult<Vec<SubtitleCue>> {
        if !path.exists() {
            return Err(EngineError::MissingArtifact(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        parse_srt(&content)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubtitleConfig {
    /// Only the first N dialogues of a story get subtitles.
    pub debug_limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AlignedSubtitles {
    pub materials: Vec<SubtitleMaterial>,
    pub segments: Vec<SubtitleSegment>,
}

pub struct SubtitleAligner {
    config: SubtitleConfig,
}

impl SubtitleAligner {
    pub fn new(config: SubtitleConfig) -> Self {
        SubtitleAligner { config }
    }

    pub fn align(
        &self,
        story: &Story,
        attachments: &Attachments,
        audio_segments: &[PlacedSegment],
        source: &dyn CueSource,
    ) -> EngineResult<AlignedSubtitles> {
        let mut aligned = AlignedSubtitles::default();

        let limit = match self.config.debug_limit {
            Some(n) => {
                info!(limit = n, "subtitle debug limit active");
                n
            }
            None => story.dialogues.len(),
        };

        for dialogue in story.dialogues.iter().take(limit) {
            let Some(cue_path) = attachments.subtitle_cues(dialogue.index) else {
                continue;
            };
            let Some(audio) = audio_segments
                .iter()
                .find(|s| s.dialogue_index == dialogue.index)
            else {
                debug!(index = dialogue.index, "dialogue not placed, no subtitles");
                continue;
            };

            let cues = match source.load(cue_path) {
                Ok(cues) => cues,
                Err(e) if e.is_dialogue_scoped() || matches!(e, EngineError::Io(_)) => {
                    warn!(index = dialogue.index, error = %e, "subtitles skipped for dialogue");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let offset = audio.target_range.start;
            for cue in cues {
                let duration = cue.end - cue.start;
                if duration <= 0 {
                    warn!(index = dialogue.index, start = cue.start, end = cue.end, "dropping cue with non-positive duration");
                    continue;
                }
                let text = clean_cue_text(&cue.text);
                if text.is_empty() {
                    continue;
                }

                let material = SubtitleMaterial::new(text);
                aligned.segments.push(SubtitleSegment {
                    id: new_segment_id(),
                    dialogue_index: dialogue.index,
                    material_id: material.id.clone(),
                    source_range: TimeRange::new(0, duration),
                    target_range: TimeRange::new(offset + cue.start, duration),
                });
                aligned.materials.push(material);
            }
        }

        Ok(aligned)
    }
}
