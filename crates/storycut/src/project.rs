//! The project cache: one JSON document per source video, recording the story
//! analysis and what each pipeline stage produced for every story.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use engine::story::RawStory;

/// One cut produced from a rendered story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub segment_index: usize,
    pub video_path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub dialogue_indices: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryEntry {
    #[serde(flatten)]
    pub story: RawStory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_video_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_video_segments: Option<Vec<ChunkRecord>>,
}

impl StoryEntry {
    pub fn new(story: RawStory) -> Self {
        StoryEntry {
            story,
            start_index: None,
            end_index: None,
            draft_path: None,
            exported_video_path: None,
            outer_speed: None,
            split_video_segments: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSegment {
    pub segment_index: usize,
    pub org_video_file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_audio_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub stories: Vec<StoryEntry>,
}

impl SourceSegment {
    /// Short identifier used to prefix draft and chunk names: the source file
    /// stem up to its first underscore.
    pub fn video_id(&self) -> String {
        video_id_for(&self.org_video_file_path)
    }
}

pub fn video_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.split_once('_') {
        Some((head, _)) if !head.is_empty() => head.to_string(),
        _ if stem.is_empty() => "video".to_string(),
        _ => stem,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCache {
    #[serde(default)]
    pub url: String,
    pub project_created_time: DateTime<Local>,
    #[serde(default)]
    pub segments: Vec<SourceSegment>,
}

impl ProjectCache {
    pub fn new(url: impl Into<String>) -> Self {
        ProjectCache {
            url: url.into(),
            project_created_time: Local::now(),
            segments: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project cache {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse project cache {}", path.display()))
    }

    /// Write through a sibling temp file and rename, so an interrupted save
    /// leaves the previous cache intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace project cache {}", path.display()))?;
        Ok(())
    }

    pub fn story_count(&self) -> usize {
        self.segments.iter().map(|s| s.stories.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CACHE: &str = r#"{
        "url": "https://www.bilibili.com/video/BV1684y1r7Qw",
        "project_created_time": "2025-03-01T10:20:30.123456+08:00",
        "segments": [{
            "url": "https://www.bilibili.com/video/BV1684y1r7Qw",
            "segment_index": 1,
            "start_time": "00:00:00",
            "duration": "00:10:00",
            "org_video_file_path": "downloads/BV1684y1r7Qw_part1.mp4",
            "org_audio_file_path": "downloads/BV1684y1r7Qw_part1.wav",
            "srt_file_path": null,
            "stories": [{
                "story_title": "Krabby Patty heist",
                "start_index": 3,
                "end_index": 9,
                "dialogue": [{
                    "index": 3,
                    "video_segments": [{"start": "00:00:10,000", "end": "00:00:20,000"}],
                    "chinese": "",
                    "english": "hi",
                    "audio_path": "voice/3.mp3",
                    "srt_path": null
                }]
            }]
        }]
    }"#;

    #[test]
    fn loads_upstream_cache_and_keeps_story_fields() {
        let cache: ProjectCache = serde_json::from_str(CACHE).unwrap();
        assert_eq!(cache.story_count(), 1);
        let segment = &cache.segments[0];
        assert_eq!(segment.video_id(), "BV1684y1r7Qw");
        let entry = &segment.stories[0];
        assert_eq!(entry.story.story_title, "Krabby Patty heist");
        assert_eq!(entry.start_index, Some(3));
        assert_eq!(entry.story.dialogue[0].audio_path.as_deref(), Some("voice/3.mp3"));
        assert!(entry.exported_video_path.is_none());
    }

    #[test]
    fn save_then_load_preserves_stage_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache").join("project.json");

        let mut cache: ProjectCache = serde_json::from_str(CACHE).unwrap();
        let entry = &mut cache.segments[0].stories[0];
        entry.exported_video_path = Some("out/story.mp4".into());
        entry.outer_speed = Some(1.25);
        entry.split_video_segments = Some(vec![ChunkRecord {
            segment_index: 1,
            video_path: "out/story_part1.mp4".into(),
            start_time: 0.0,
            end_time: 40.0,
            duration: 40.0,
            dialogue_indices: vec![3],
        }]);
        cache.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = ProjectCache::load(&path).unwrap();
        let entry = &reloaded.segments[0].stories[0];
        assert_eq!(entry.outer_speed, Some(1.25));
        assert_eq!(entry.split_video_segments.as_ref().unwrap()[0].dialogue_indices, vec![3]);
        assert_eq!(reloaded.project_created_time, cache.project_created_time);
    }

    #[test]
    fn video_id_falls_back_to_whole_stem() {
        assert_eq!(video_id_for(Path::new("/a/BV1xyz.mp4")), "BV1xyz");
        assert_eq!(video_id_for(Path::new("_odd.mp4")), "_odd");
        assert_eq!(video_id_for(Path::new("")), "video");
    }
}
