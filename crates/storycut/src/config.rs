use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use engine::placer::PlacerConfig;
use engine::splitter::SplitBounds;
use engine::subtitles::SubtitleConfig;
use engine::timecode::seconds_to_microseconds;
use engine::GlobalSpeedNormalizer;

pub const EXPORT_URL_ENV: &str = "EXPORT_VIDEO_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorycutConfig {
    #[serde(default)]
    pub speed: SpeedConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub subtitles: SubtitlesConfig,
    #[serde(default)]
    pub draft: DraftConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub target_duration_seconds: f64,
    pub max_speed: f64,
    /// Per-dialogue segment speeds above this are logged, never clamped.
    pub segment_speed_warning: Option<f64>,
    pub audio_epsilon_seconds: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        SpeedConfig {
            target_duration_seconds: 59.0,
            max_speed: 2.0,
            segment_speed_warning: Some(20.0),
            audio_epsilon_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// End of each dialogue's last source span.
    SourceSpan,
    /// End of each dialogue's voice-over on the nested timeline.
    Placed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub min_seconds: f64,
    pub max_seconds: f64,
    pub boundary: BoundaryMode,
    pub organize_by_source: bool,
    pub output_dir: PathBuf,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            min_seconds: 36.0,
            max_seconds: 60.0,
            boundary: BoundaryMode::SourceSpan,
            organize_by_source: true,
            output_dir: PathBuf::from("output/split_videos"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitlesConfig {
    pub enabled: bool,
    pub debug_limit: Option<usize>,
}

impl Default for SubtitlesConfig {
    fn default() -> Self {
        SubtitlesConfig {
            enabled: true,
            debug_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    pub output_dir: PathBuf,
    pub background_audio: Option<PathBuf>,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            output_dir: PathBuf::from("output/draft_folder"),
            background_audio: None,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub export_url: String,
    pub timeout_seconds: u64,
    pub target_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            export_url: "http://localhost:51053".to_string(),
            timeout_seconds: 3600,
            target_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl StorycutConfig {
    /// Load from a TOML file, or defaults when no path is given. The export URL
    /// can be overridden through `EXPORT_VIDEO_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => StorycutConfig::default(),
        };

        if let Ok(url) = std::env::var(EXPORT_URL_ENV) {
            if !url.is_empty() {
                config.render.export_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.normalizer()?;
        self.split_bounds()?;
        if !(self.speed.audio_epsilon_seconds > 0.0) {
            anyhow::bail!("speed.audio_epsilon_seconds must be positive");
        }
        Ok(())
    }

    pub fn normalizer(&self) -> Result<GlobalSpeedNormalizer> {
        Ok(GlobalSpeedNormalizer::new(
            self.speed.target_duration_seconds,
            self.speed.max_speed,
        )?)
    }

    pub fn split_bounds(&self) -> Result<SplitBounds> {
        Ok(SplitBounds::new(self.split.min_seconds, self.split.max_seconds)?)
    }

    pub fn placer(&self) -> PlacerConfig {
        PlacerConfig {
            audio_epsilon: seconds_to_microseconds(self.speed.audio_epsilon_seconds),
            speed_warning: self.speed.segment_speed_warning,
        }
    }

    pub fn subtitle_config(&self) -> Option<SubtitleConfig> {
        self.subtitles.enabled.then_some(SubtitleConfig {
            debug_limit: self.subtitles.debug_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = StorycutConfig::from_toml("").unwrap();
        assert_eq!(config.speed.target_duration_seconds, 59.0);
        assert_eq!(config.speed.max_speed, 2.0);
        assert_eq!(config.split.min_seconds, 36.0);
        assert_eq!(config.split.max_seconds, 60.0);
        assert_eq!(config.split.boundary, BoundaryMode::SourceSpan);
        assert_eq!(config.render.timeout_seconds, 3600);
        assert!(config.subtitle_config().is_some());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StorycutConfig::from_toml(
            r#"
            [speed]
            max_speed = 1.5

            [split]
            boundary = "placed"

            [subtitles]
            debug_limit = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.speed.max_speed, 1.5);
        assert_eq!(config.speed.target_duration_seconds, 59.0);
        assert_eq!(config.split.boundary, BoundaryMode::Placed);
        assert_eq!(config.subtitle_config().unwrap().debug_limit, Some(2));
        assert_eq!(config.placer().audio_epsilon, 100_000);
    }

    #[test]
    fn disabled_subtitles_have_no_aligner_config() {
        let config = StorycutConfig::from_toml("[subtitles]\nenabled = false\n").unwrap();
        assert!(config.subtitle_config().is_none());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = StorycutConfig::from_toml("[speed]\nmax_speed = 0.5\n").unwrap();
        assert!(config.validate().is_err());
        let config = StorycutConfig::from_toml("[split]\nmin_seconds = 70.0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
