//! Serialisable composite draft for the external editor: the nested timeline
//! embedded as one clip on the main timeline, played at the outer speed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::materials::{Material, MaterialId, MaterialKind};
use crate::speed::SpeedPlan;
use crate::timecode::TimeValue;
use crate::timeline::{new_segment_id, PlacedSegment, SubtitleMaterial, SynthesizedTimeline, TimeRange};

/// Prefix the editor resolves to the draft folder.
pub const MATERIAL_PATH_PREFIX: &str =
    "##_draftpath_placeholder_0E685133-18CE-45ED-8CB8-2904A212EC80_##/materials";

const TITLE_LINE_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DraftTimeRange {
    pub start: TimeValue,
    pub duration: TimeValue,
}

impl From<TimeRange> for DraftTimeRange {
    fn from(range: TimeRange) -> Self {
        DraftTimeRange {
            start: range.start,
            duration: range.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub scale: Scale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSegment {
    pub id: String,
    pub material_id: String,
    pub source_timerange: DraftTimeRange,
    pub target_timerange: DraftTimeRange,
    pub speed: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<Clip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTrack {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub segments: Vec<DraftSegment>,
}

impl DraftTrack {
    fn new(kind: &str, segments: Vec<DraftSegment>) -> Self {
        DraftTrack {
            id: new_segment_id(),
            kind: kind.to_string(),
            segments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMaterialEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    pub duration: Option<TimeValue>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMaterial {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// JSON-encoded `{"text": .., "styles": [{"range": [0, len]}]}`.
    pub content: String,
}

impl TextMaterial {
    fn new(id: &MaterialId, text: &str, style_range: [usize; 2]) -> Self {
        let content = serde_json::json!({
            "text": text,
            "styles": [{ "range": style_range }],
        });
        TextMaterial {
            id: id.to_string(),
            kind: "text".to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&SubtitleMaterial> for TextMaterial {
    fn from(material: &SubtitleMaterial) -> Self {
        TextMaterial::new(&material.id, &material.text, material.style_range)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftMaterials {
    #[serde(default)]
    pub videos: Vec<MediaMaterialEntry>,
    #[serde(default)]
    pub audios: Vec<MediaMaterialEntry>,
    #[serde(default)]
    pub texts: Vec<TextMaterial>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drafts: Vec<NestedDraftMaterial>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedDraft {
    pub id: String,
    pub duration: TimeValue,
    pub materials: DraftMaterials,
    pub tracks: Vec<DraftTrack>,
}

/// Shares its id with the composite video material on the main timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedDraftMaterial {
    pub id: String,
    pub draft: NestedDraft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeDraft {
    pub id: String,
    pub duration: TimeValue,
    pub materials: DraftMaterials,
    pub tracks: Vec<DraftTrack>,
}

impl CompositeDraft {
    pub fn nested(&self) -> Option<&NestedDraft> {
        self.materials.drafts.first().map(|d| &d.draft)
    }

    /// The single segment that embeds the nested timeline.
    pub fn composite_segment(&self) -> Option<&DraftSegment> {
        self.tracks
            .iter()
            .find(|t| t.kind == "video")
            .and_then(|t| t.segments.first())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundAudio {
    pub path: String,
    pub duration: TimeValue,
}

#[derive(Debug, Clone)]
pub struct DraftSettings {
    pub scale: Scale,
    pub source_video_duration: Option<TimeValue>,
    pub background_audio: Option<BackgroundAudio>,
}

impl Default for DraftSettings {
    fn default() -> Self {
        DraftSettings {
            scale: Scale { x: 1.0, y: 1.0 },
            source_video_duration: None,
            background_audio: None,
        }
    }
}

fn material_path(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    format!("{}/{}", MATERIAL_PATH_PREFIX, name)
}

fn media_entry(material: &Material, duration: Option<TimeValue>) -> MediaMaterialEntry {
    let kind = match material.kind {
        MaterialKind::Video => "video",
        MaterialKind::Audio => "sound",
    };
    MediaMaterialEntry {
        id: material.id.to_string(),
        name: material.name.clone(),
        path: material_path(&material.path),
        duration,
        kind: kind.to_string(),
    }
}

fn placed_to_draft(segment: &PlacedSegment, clip: Option<Clip>) -> DraftSegment {
    DraftSegment {
        id: segment.id.clone(),
        material_id: segment.material_id.to_string(),
        source_timerange: segment.source_range.into(),
        target_timerange: segment.target_range.into(),
        speed: segment.speed,
        volume: segment.volume,
        clip,
    }
}

/// Cut the title at the first `#` (hashtags) and wrap it at 20 characters on
/// word boundaries.
pub fn format_title_text(title: &str) -> String {
    let head = title.split('#').next().unwrap_or("").trim();
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in head.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        let candidate_len = if current_len > 0 {
            current_len + 1 + word_len
        } else {
            word_len
        };

        if candidate_len > TITLE_LINE_WIDTH && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            if current_len > 0 {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

/// Folder name for a story's draft: `<video_id>_story_<n>_<title prefix>`.
pub fn draft_name(video_id: &str, story_number: usize, title: &str) -> String {
    let slug: String = title
        .replace(' ', "_")
        .replace(['/', '\\'], "_")
        .chars()
        .take(20)
        .collect();
    format!("{}_story_{}_{}", video_id, story_number, slug)
}

/// Assemble the editor draft from a synthesized timeline and its outer speed.
pub fn assemble_draft(
    title: &str,
    timeline: &SynthesizedTimeline,
    speed: &SpeedPlan,
    settings: &DraftSettings,
) -> CompositeDraft {
    let audio_durations: HashMap<&MaterialId, TimeValue> = timeline
        .audio_segments
        .iter()
        .map(|s| (&s.material_id, s.source_range.duration))
        .collect();

    let mut nested_materials = DraftMaterials::default();
    for material in &timeline.materials {
        match material.kind {
            MaterialKind::Video => nested_materials
                .videos
                .push(media_entry(material, settings.source_video_duration)),
            MaterialKind::Audio => nested_materials.audios.push(media_entry(
                material,
                audio_durations.get(&material.id).copied(),
            )),
        }
    }
    nested_materials.texts = timeline.subtitle_materials.iter().map(TextMaterial::from).collect();

    let clip = Some(Clip {
        scale: settings.scale,
    });
    let video_track = DraftTrack::new(
        "video",
        timeline
            .video_segments
            .iter()
            .map(|s| placed_to_draft(s, clip))
            .collect(),
    );
    let audio_track = DraftTrack::new(
        "audio",
        timeline
            .audio_segments
            .iter()
            .map(|s| placed_to_draft(s, None))
            .collect(),
    );
    let text_track = DraftTrack::new(
        "text",
        timeline
            .subtitle_segments
            .iter()
            .map(|s| DraftSegment {
                id: s.id.clone(),
                material_id: s.material_id.to_string(),
                source_timerange: s.source_range.into(),
                target_timerange: s.target_range.into(),
                speed: 1.0,
                volume: 1.0,
                clip: None,
            })
            .collect(),
    );

    let composite_id = MaterialId::generate();
    let nested = NestedDraft {
        id: new_segment_id(),
        duration: timeline.total_duration,
        materials: nested_materials,
        tracks: vec![video_track, audio_track, text_track],
    };

    let mut main_materials = DraftMaterials {
        videos: vec![MediaMaterialEntry {
            id: composite_id.to_string(),
            name: title.to_string(),
            path: String::new(),
            duration: Some(timeline.total_duration),
            kind: "video".to_string(),
        }],
        drafts: vec![NestedDraftMaterial {
            id: composite_id.to_string(),
            draft: nested,
        }],
        ..DraftMaterials::default()
    };

    let composite_segment = DraftSegment {
        id: new_segment_id(),
        material_id: composite_id.to_string(),
        source_timerange: DraftTimeRange {
            start: 0,
            duration: speed.nested_duration,
        },
        target_timerange: DraftTimeRange {
            start: 0,
            duration: speed.final_duration,
        },
        speed: speed.outer_speed.value(),
        volume: 1.0,
        clip: None,
    };

    let title_text = format_title_text(title);
    let title_material = SubtitleMaterial::new(title_text);
    main_materials.texts.push(TextMaterial::from(&title_material));
    let title_segment = DraftSegment {
        id: new_segment_id(),
        material_id: title_material.id.to_string(),
        source_timerange: DraftTimeRange {
            start: 0,
            duration: speed.final_duration,
        },
        target_timerange: DraftTimeRange {
            start: 0,
            duration: speed.final_duration,
        },
        speed: 1.0,
        volume: 1.0,
        clip: None,
    };

    let mut background_segments = Vec::new();
    if let Some(bg) = &settings.background_audio {
        let bg_id = MaterialId::generate();
        let name = Path::new(&bg.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| bg.path.clone());
        main_materials.audios.push(MediaMaterialEntry {
            id: bg_id.to_string(),
            name,
            path: material_path(&bg.path),
            duration: Some(bg.duration),
            kind: "sound".to_string(),
        });
        background_segments.push(DraftSegment {
            id: new_segment_id(),
            material_id: bg_id.to_string(),
            source_timerange: DraftTimeRange {
                start: 0,
                duration: speed.final_duration,
            },
            target_timerange: DraftTimeRange {
                start: 0,
                duration: speed.final_duration,
            },
            speed: 1.0,
            volume: 1.0,
            clip: None,
        });
    }

    CompositeDraft {
        id: new_segment_id(),
        duration: speed.final_duration,
        materials: main_materials,
        tracks: vec![
            DraftTrack::new("video", vec![composite_segment]),
            DraftTrack::new("text", vec![title_segment]),
            DraftTrack::new("audio", background_segments),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_drops_hashtags_and_wraps() {
        assert_eq!(
            format_title_text("SpongeBob learns to fly again today #funny #cartoon"),
            "SpongeBob learns to\nfly again today"
        );
        assert_eq!(format_title_text("#only tags"), "");
        assert_eq!(format_title_text("Short"), "Short");
    }

    #[test]
    fn repeated_spaces_do_not_produce_empty_words() {
        assert_eq!(format_title_text("a  b"), "a b");
        assert_eq!(
            format_title_text("SpongeBob   learns to  fly again"),
            "SpongeBob learns to\nfly again"
        );
    }

    #[test]
    fn overlong_single_word_gets_its_own_line() {
        assert_eq!(
            format_title_text("a supercalifragilisticexpialidocious b"),
            "a\nsupercalifragilisticexpialidocious\nb"
        );
    }

    #[test]
    fn draft_name_truncates_title() {
        assert_eq!(
            draft_name("BV1684y1r7Qw", 1, "Spongebob's big day at the krusty krab"),
            "BV1684y1r7Qw_story_1_Spongebob's_big_day_"
        );
        assert_eq!(draft_name("v", 2, "a/b"), "v_story_2_a_b");
    }

    #[test]
    fn text_material_content_is_json_with_range() {
        let material = SubtitleMaterial::new("Hello world".into());
        let text = TextMaterial::from(&material);
        let content: serde_json::Value = serde_json::from_str(&text.content).unwrap();
        assert_eq!(content["text"], "Hello world");
        assert_eq!(content["styles"][0]["range"], serde_json::json!([0, 11]));
    }

    #[test]
    fn material_paths_point_into_draft_folder() {
        assert_eq!(
            material_path("/tmp/voice/a.mp3"),
            format!("{MATERIAL_PATH_PREFIX}/a.mp3")
        );
    }
}
