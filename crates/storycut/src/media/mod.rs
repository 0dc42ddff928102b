pub mod ffmpeg;

use anyhow::Result;
use std::path::Path;

pub use ffmpeg::{FFmpegWrapper, MediaInfo};

/// External media tooling used by the pipeline: stream and duration probing,
/// and stream-copy trimming of the rendered story.
#[async_trait::async_trait]
pub trait MediaTool: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    async fn trim_copy(
        &self,
        input: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<()>;
}
