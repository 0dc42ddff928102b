use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use engine::splitter::DialogueBoundary;
use engine::story::parse_story_document;
use engine::timecode::{seconds_to_microseconds, MICROS_PER_SECOND};
use engine::OuterSpeed;
use storycut::config::StorycutConfig;
use storycut::media::{MediaInfo, MediaTool};
use storycut::pipeline::{Pipeline, SplitOutcome, DRAFT_CONTENT_FILE};
use storycut::project::{ProjectCache, SourceSegment, StoryEntry};
use storycut::render::RenderService;

/// Durations keyed by file name; `.mp3` files carry audio only. Trims write a
/// placeholder file.
#[derive(Default)]
struct MockMedia {
    durations: HashMap<String, f64>,
    trims: Mutex<Vec<(f64, f64, PathBuf)>>,
}

impl MockMedia {
    fn with(durations: &[(&str, f64)]) -> Self {
        MockMedia {
            durations: durations
                .iter()
                .map(|(name, secs)| (name.to_string(), *secs))
                .collect(),
            trims: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl MediaTool for MockMedia {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seconds = self
            .durations
            .get(&name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no such media: {}", path.display()))?;
        Ok(MediaInfo {
            duration: seconds_to_microseconds(seconds),
            has_video: !name.ends_with(".mp3"),
            has_audio: true,
        })
    }

    async fn trim_copy(&self, _input: &Path, start: f64, duration: f64, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, b"chunk")?;
        self.trims
            .lock()
            .unwrap()
            .push((start, duration, output.to_path_buf()));
        Ok(())
    }
}

/// Renders every draft to `<dir>/<draft_name>.mp4`.
struct MockRenderer {
    dir: PathBuf,
    healthy: bool,
    exported: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl RenderService for MockRenderer {
    async fn health_check(&self) -> Result<()> {
        anyhow::ensure!(self.healthy, "export service down");
        Ok(())
    }

    async fn export(&self, draft_name: &str, draft_path: &Path) -> Result<PathBuf> {
        anyhow::ensure!(
            draft_path.join(DRAFT_CONTENT_FILE).exists(),
            "draft content missing"
        );
        std::fs::create_dir_all(&self.dir)?;
        let output = self.dir.join(format!("{draft_name}.mp4"));
        std::fs::write(&output, b"rendered")?;
        self.exported.lock().unwrap().push(draft_name.to_string());
        Ok(output)
    }
}

struct Fixture {
    tmp: tempfile::TempDir,
    config: StorycutConfig,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = StorycutConfig::default();
        config.draft.output_dir = tmp.path().join("drafts");
        config.split.output_dir = tmp.path().join("chunks");
        for name in ["vid_src.mp4", "v1.mp3", "v2.mp3", "v3.mp3"] {
            std::fs::write(tmp.path().join(name), b"media").unwrap();
        }
        Fixture { tmp, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    /// Three dialogues of 40s source footage, each against 20s of voice-over.
    fn story_json(&self, title: &str, voice: bool) -> String {
        let dialogues: Vec<String> = (0..3)
            .map(|i| {
                let audio = if voice {
                    format!(
                        r#","audio_path":"{}""#,
                        self.path(&format!("v{}.mp3", i + 1)).display()
                    )
                } else {
                    String::new()
                };
                format!(
                    r#"{{"index":{idx},"english":"line {idx}","video_segments":[{{"start":"00:{s:02}:{ss:02},000","end":"00:{e:02}:{es:02},000"}}]{audio}}}"#,
                    idx = i + 1,
                    s = (i * 40) / 60,
                    ss = (i * 40) % 60,
                    e = (i * 40 + 40) / 60,
                    es = (i * 40 + 40) % 60,
                )
            })
            .collect();
        format!(
            r#"{{"story_title":"{title}","dialogue":[{}]}}"#,
            dialogues.join(",")
        )
    }

    fn media(&self, rendered_seconds: f64) -> MockMedia {
        MockMedia::with(&[
            ("vid_src.mp4", 300.0),
            ("v1.mp3", 20.0),
            ("v2.mp3", 20.0),
            ("v3.mp3", 20.0),
            ("vid_story_1_Heist.mp4", rendered_seconds),
            ("rendered.mp4", rendered_seconds),
        ])
    }
}

fn pipeline(config: StorycutConfig, media: Arc<MockMedia>, renderer: Arc<MockRenderer>) -> Pipeline {
    Pipeline::new(config, media, renderer)
}

fn renderer(dir: PathBuf) -> Arc<MockRenderer> {
    Arc::new(MockRenderer {
        dir,
        healthy: true,
        exported: Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn synthesize_story_writes_draft_folder() {
    let fx = Fixture::new();
    let media = Arc::new(fx.media(120.0));
    let pipeline = pipeline(fx.config.clone(), media, renderer(fx.path("renders")));

    let raw = parse_story_document(&fx.story_json("Heist", true)).unwrap();
    let drafted = pipeline
        .synthesize_story(raw, &fx.path("vid_src.mp4"), "vid_story_1_Heist")
        .await
        .unwrap();

    assert_eq!(drafted.synthesis.timeline.total_duration, 60 * MICROS_PER_SECOND);
    assert!(drafted.synthesis.timeline.video_segments.iter().all(|s| s.speed == 2.0));
    assert!(drafted.synthesis.speed.outer_speed.value() > 1.0);

    let draft_file = drafted.draft_dir.join(DRAFT_CONTENT_FILE);
    let content: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(draft_file).unwrap()).unwrap();
    assert_eq!(content["duration"], drafted.synthesis.speed.final_duration);
    let nested = &content["materials"]["drafts"][0]["draft"];
    assert_eq!(nested["materials"]["videos"][0]["duration"], 300 * MICROS_PER_SECOND);
    assert_eq!(nested["materials"]["audios"].as_array().unwrap().len(), 3);

    let materials = drafted.draft_dir.join("materials");
    for name in ["vid_src.mp4", "v1.mp3", "v2.mp3", "v3.mp3"] {
        assert!(materials.join(name).exists(), "{name} not copied");
    }
}

#[tokio::test]
async fn split_outcomes_follow_rendered_length() {
    let fx = Fixture::new();
    let boundaries: Vec<DialogueBoundary> = [40, 80, 120]
        .iter()
        .enumerate()
        .map(|(i, &s)| DialogueBoundary {
            index: i as u32 + 1,
            end: s * MICROS_PER_SECOND,
        })
        .collect();
    let rendered = fx.path("rendered.mp4");

    let short = pipeline(fx.config.clone(), Arc::new(fx.media(20.0)), renderer(fx.path("r")));
    let outcome = short
        .split_rendered(&rendered, &boundaries, OuterSpeed::NORMAL)
        .await
        .unwrap();
    assert!(matches!(outcome, SplitOutcome::TooShort { duration } if duration == 20.0));
    assert!(outcome.chunks().is_empty());

    let fits = pipeline(fx.config.clone(), Arc::new(fx.media(50.0)), renderer(fx.path("r")));
    let outcome = fits
        .split_rendered(&rendered, &boundaries, OuterSpeed::NORMAL)
        .await
        .unwrap();
    let chunks = outcome.chunks();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].video_path, rendered);
    assert_eq!(chunks[0].dialogue_indices, vec![1, 2, 3]);

    let mut flat = fx.config.clone();
    flat.split.organize_by_source = false;
    let media = Arc::new(fx.media(120.0));
    let long = pipeline(flat, media.clone(), renderer(fx.path("r")));
    let outcome = long
        .split_rendered(&rendered, &boundaries, OuterSpeed::NORMAL)
        .await
        .unwrap();
    let chunks = outcome.chunks();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!((36.0..=60.0).contains(&chunk.duration));
        assert!(chunk.video_path.exists());
    }
    assert_eq!(chunks[0].video_path, fx.path("chunks").join("rendered_part1.mp4"));
    assert_eq!(media.trims.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn rendered_file_without_video_stream_is_rejected() {
    let fx = Fixture::new();
    let boundaries = vec![DialogueBoundary {
        index: 1,
        end: 40 * MICROS_PER_SECOND,
    }];
    let media = Arc::new(fx.media(120.0));
    let pipeline = pipeline(fx.config.clone(), media.clone(), renderer(fx.path("r")));

    let err = pipeline
        .split_rendered(&fx.path("v1.mp3"), &boundaries, OuterSpeed::NORMAL)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no video stream"));
    assert!(media.trims.lock().unwrap().is_empty());
}

fn project_cache(fx: &Fixture, titles: &[(&str, bool)]) -> ProjectCache {
    let mut cache = ProjectCache::new("https://example.com/video/vid");
    cache.segments.push(SourceSegment {
        segment_index: 1,
        org_video_file_path: fx.path("vid_src.mp4"),
        org_audio_file_path: None,
        srt_file_path: None,
        start_time: None,
        duration: None,
        stories: titles
            .iter()
            .map(|(title, voice)| {
                StoryEntry::new(parse_story_document(&fx.story_json(title, *voice)).unwrap())
            })
            .collect(),
    });
    cache
}

#[tokio::test]
async fn run_project_processes_stories_and_records_failures() {
    let fx = Fixture::new();
    let cache_path = fx.path("project.json");
    project_cache(&fx, &[("Heist", true), ("Silent", false)])
        .save(&cache_path)
        .unwrap();

    let media = Arc::new(fx.media(120.0));
    let render = renderer(fx.path("renders"));
    let pipeline = pipeline(fx.config.clone(), media, render.clone());
    let report = pipeline.run_project(&cache_path).await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title, "Silent");
    assert_eq!(*render.exported.lock().unwrap(), vec!["vid_story_1_Heist".to_string()]);

    let saved = ProjectCache::load(&cache_path).unwrap();
    let heist = &saved.segments[0].stories[0];
    let outer = heist.outer_speed.unwrap();
    assert!((outer - 60.0 / 59.0).abs() < 1e-9);
    assert_eq!(
        heist.exported_video_path.as_deref(),
        Some(fx.path("renders").join("vid_story_1_Heist.mp4").as_path())
    );
    let chunks = heist.split_video_segments.as_ref().unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks[0].video_path,
        fx.path("chunks").join("vid").join("story_1_Heist_part1.mp4")
    );
    assert!((chunks[0].end_time - 40.0 / outer).abs() < 1e-6);
    assert_eq!(chunks[2].dialogue_indices, vec![3]);

    let silent = &saved.segments[0].stories[1];
    assert!(silent.exported_video_path.is_none());
    assert!(silent.split_video_segments.is_none());
}

#[tokio::test]
async fn run_project_stops_before_drafting_when_export_service_is_down() {
    let fx = Fixture::new();
    let cache_path = fx.path("project.json");
    project_cache(&fx, &[("Heist", true)]).save(&cache_path).unwrap();

    let render = Arc::new(MockRenderer {
        dir: fx.path("renders"),
        healthy: false,
        exported: Mutex::new(Vec::new()),
    });
    let pipeline = pipeline(fx.config.clone(), Arc::new(fx.media(120.0)), render.clone());

    let err = pipeline.run_project(&cache_path).await.unwrap_err();
    assert!(format!("{err:#}").contains("export service down"));
    assert!(render.exported.lock().unwrap().is_empty());
    assert!(!fx.config.draft.output_dir.exists());

    let saved = ProjectCache::load(&cache_path).unwrap();
    assert!(saved.segments[0].stories[0].draft_path.is_none());
}
