use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::timecode::{parse_subtitle_time, TimeValue};

/// A cut `[start, end)` from the shared source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: TimeValue,
    pub end: TimeValue,
}

impl SourceSpan {
    pub fn new(index: u32, start: TimeValue, end: TimeValue) -> EngineResult<Self> {
        if end <= start {
            return Err(EngineError::InvalidSpan { index, start, end });
        }
        Ok(SourceSpan { start, end })
    }

    pub fn duration(&self) -> TimeValue {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    pub index: u32,
    pub video_spans: Vec<SourceSpan>,
    #[serde(default)]
    pub chinese: String,
    #[serde(default)]
    pub english: String,
}

impl Dialogue {
    pub fn total_span_duration(&self) -> TimeValue {
        self.video_spans.iter().map(SourceSpan::duration).sum()
    }

    pub fn last_span_end(&self) -> Option<TimeValue> {
        self.video_spans.last().map(|s| s.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub dialogues: Vec<Dialogue>,
}

impl Story {
    /// Build a story from upstream analysis output.
    ///
    /// Dialogues with malformed or non-positive spans, or a repeated index, are
    /// dropped with a warning. A story left with no dialogues is an error. Any
    /// `audio_path`/`srt_path` already present upstream is returned in the side
    /// table rather than on the dialogue.
    pub fn from_raw(raw: RawStory) -> EngineResult<(Story, Attachments)> {
        let mut dialogues = Vec::with_capacity(raw.dialogue.len());
        let mut attachments = Attachments::default();
        let mut seen = HashSet::new();

        for raw_dialogue in raw.dialogue {
            let index = raw_dialogue.index;
            if !seen.insert(index) {
                warn!(story = %raw.story_title, index, "duplicate dialogue index, skipping");
                continue;
            }

            let spans = match parse_spans(index, &raw_dialogue.video_segments) {
                Ok(spans) => spans,
                Err(e) => {
                    warn!(story = %raw.story_title, index, error = %e, "skipping dialogue");
                    continue;
                }
            };

            if let Some(path) = raw_dialogue.audio_path.filter(|p| !p.is_empty()) {
                attachments.attach_voice_over(index, path);
            }
            if let Some(path) = raw_dialogue.srt_path.filter(|p| !p.is_empty()) {
                attachments.attach_subtitles(index, path);
            }

            dialogues.push(Dialogue {
                index,
                video_spans: spans,
                chinese: raw_dialogue.chinese,
                english: raw_dialogue.english,
            });
        }

        if dialogues.is_empty() {
            return Err(EngineError::EmptyStory(raw.story_title));
        }

        Ok((
            Story {
                title: raw.story_title,
                dialogues,
            },
            attachments,
        ))
    }

    pub fn dialogue(&self, index: u32) -> Option<&Dialogue> {
        self.dialogues.iter().find(|d| d.index == index)
    }
}

fn parse_spans(index: u32, raw: &[RawSpan]) -> EngineResult<Vec<SourceSpan>> {
    raw.iter()
        .map(|span| {
            let start = parse_subtitle_time(&span.start)?;
            let end = parse_subtitle_time(&span.end)?;
            SourceSpan::new(index, start, end)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDialogue {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub video_segments: Vec<RawSpan>,
    #[serde(default)]
    pub chinese: String,
    #[serde(default)]
    pub english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStory {
    #[serde(default = "default_title")]
    pub story_title: String,
    #[serde(default)]
    pub dialogue: Vec<RawDialogue>,
}

fn default_title() -> String {
    "Untitled Story".to_string()
}

/// Accepts either a single story object or the analysis step's list of stories,
/// in which case the first one is used.
pub fn parse_story_document(text: &str) -> EngineResult<RawStory> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value {
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => Ok(serde_json::from_value(first)?),
            None => Err(EngineError::EmptyStory(String::new())),
        },
        other => Ok(serde_json::from_value(other)?),
    }
}

/// Artifacts produced after parsing (voice-over, subtitle cues), keyed by
/// dialogue index. Dialogues themselves stay immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueArtifacts {
    pub voice_over_path: Option<PathBuf>,
    pub subtitle_cues_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Attachments {
    entries: BTreeMap<u32, DialogueArtifacts>,
}

impl Attachments {
    pub fn attach_voice_over(&mut self, index: u32, path: impl Into<PathBuf>) {
        self.entries.entry(index).or_default().voice_over_path = Some(path.into());
    }

    pub fn attach_subtitles(&mut self, index: u32, path: impl Into<PathBuf>) {
        self.entries.entry(index).or_default().subtitle_cues_path = Some(path.into());
    }

    pub fn get(&self, index: u32) -> Option<&DialogueArtifacts> {
        self.entries.get(&index)
    }

    pub fn voice_over(&self, index: u32) -> Option<&Path> {
        self.entries
            .get(&index)
            .and_then(|a| a.voice_over_path.as_deref())
    }

    pub fn subtitle_cues(&self, index: u32) -> Option<&Path> {
        self.entries
            .get(&index)
            .and_then(|a| a.subtitle_cues_path.as_deref())
    }

    pub fn voice_over_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .values()
            .filter_map(|a| a.voice_over_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_span(start: &str, end: &str) -> RawSpan {
        RawSpan {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    fn raw_dialogue(index: u32, spans: Vec<RawSpan>) -> RawDialogue {
        RawDialogue {
            index,
            video_segments: spans,
            chinese: String::new(),
            english: format!("line {index}"),
            audio_path: None,
            srt_path: None,
        }
    }

    #[test]
    fn malformed_dialogue_is_skipped_not_fatal() {
        let raw = RawStory {
            story_title: "t".into(),
            dialogue: vec![
                raw_dialogue(1, vec![raw_span("00:00:00,000", "00:00:02,000")]),
                raw_dialogue(2, vec![raw_span("00:00:02.000", "00:00:03,000")]),
                raw_dialogue(3, vec![raw_span("00:00:05,000", "00:00:04,000")]),
                raw_dialogue(4, vec![raw_span("00:00:05,000", "00:00:07,000")]),
            ],
        };
        let (story, _) = Story::from_raw(raw).unwrap();
        let kept: Vec<u32> = story.dialogues.iter().map(|d| d.index).collect();
        assert_eq!(kept, vec![1, 4]);
    }

    #[test]
    fn duplicate_index_keeps_first() {
        let raw = RawStory {
            story_title: "t".into(),
            dialogue: vec![
                raw_dialogue(1, vec![raw_span("00:00:00,000", "00:00:02,000")]),
                raw_dialogue(1, vec![raw_span("00:00:03,000", "00:00:04,000")]),
            ],
        };
        let (story, _) = Story::from_raw(raw).unwrap();
        assert_eq!(story.dialogues.len(), 1);
        assert_eq!(story.dialogues[0].video_spans[0].end, 2_000_000);
    }

    #[test]
    fn empty_story_is_structural_error() {
        let raw = RawStory {
            story_title: "nothing".into(),
            dialogue: vec![raw_dialogue(1, vec![raw_span("bad", "00:00:01,000")])],
        };
        let err = Story::from_raw(raw).unwrap_err();
        assert!(matches!(err, EngineError::EmptyStory(title) if title == "nothing"));
    }

    #[test]
    fn upstream_paths_move_into_side_table() {
        let mut d = raw_dialogue(7, vec![raw_span("00:00:00,000", "00:00:01,000")]);
        d.audio_path = Some("voice/7.mp3".into());
        d.srt_path = Some(String::new());
        let raw = RawStory {
            story_title: "t".into(),
            dialogue: vec![d],
        };
        let (_, attachments) = Story::from_raw(raw).unwrap();
        assert_eq!(attachments.voice_over(7), Some(Path::new("voice/7.mp3")));
        assert_eq!(attachments.subtitle_cues(7), None);
    }

    #[test]
    fn document_may_be_a_list_of_stories() {
        let text = r#"[{"story_title":"first","dialogue":[{"index":1,"video_segments":[{"start":"00:00:01,000","end":"00:00:02,500"}],"english":"hi"}]},{"story_title":"second"}]"#;
        let raw = parse_story_document(text).unwrap();
        assert_eq!(raw.story_title, "first");
        let (story, _) = Story::from_raw(raw).unwrap();
        assert_eq!(story.dialogues[0].total_span_duration(), 1_500_000);
        assert_eq!(story.dialogues[0].last_span_end(), Some(2_500_000));
    }

    #[test]
    fn empty_document_list_is_rejected() {
        assert!(matches!(
            parse_story_document("[]"),
            Err(EngineError::EmptyStory(_))
        ));
        assert!(matches!(
            parse_story_document("{not json"),
            Err(EngineError::Json(_))
        ));
    }
}
