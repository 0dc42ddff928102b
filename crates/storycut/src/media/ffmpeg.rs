use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use engine::timecode::{seconds_to_microseconds, TimeValue};

use super::MediaTool;
use crate::config::MediaConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: TimeValue,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
}

impl ProbeOutput {
    fn duration_seconds(&self) -> Option<f64> {
        self.format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.trim().parse::<f64>().ok())
    }

    fn has_stream(&self, kind: &str) -> bool {
        self.streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some(kind))
    }
}

fn parse_probe(stdout: &[u8]) -> Result<MediaInfo> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe JSON output")?;
    let seconds = probe
        .duration_seconds()
        .context("ffprobe reported no duration")?;
    Ok(MediaInfo {
        duration: seconds_to_microseconds(seconds),
        has_video: probe.has_stream("video"),
        has_audio: probe.has_stream("audio"),
    })
}

#[derive(Debug, Clone)]
pub struct FFmpegWrapper {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FFmpegWrapper {
    pub fn new(config: &MediaConfig) -> Self {
        FFmpegWrapper {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    /// `ffmpeg -i in -ss start -t duration -c copy -y out`
    pub async fn trim(
        &self,
        input_path: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output_path: &Path,
    ) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args: Vec<OsString> = vec![
            "-i".into(),
            input_path.into(),
            "-ss".into(),
            format!("{start_seconds:.3}").into(),
            "-t".into(),
            format!("{duration_seconds:.3}").into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output_path.into(),
        ];
        debug!(?args, "running ffmpeg");

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .output()
            .await
            .context("Failed to execute ffmpeg. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg failed to cut {}: {}", output_path.display(), stderr);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaTool for FFmpegWrapper {
    async fn probe(&self, media_path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration:stream=codec_type", "-of", "json"])
            .arg(media_path)
            .output()
            .await
            .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed on {}: {}", media_path.display(), stderr);
        }

        parse_probe(&output.stdout)
            .with_context(|| format!("Failed to probe {}", media_path.display()))
    }

    async fn trim_copy(
        &self,
        input: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<()> {
        self.trim(input, start_seconds, duration_seconds, output).await
    }
}
