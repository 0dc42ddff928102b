//! Client for the external draft export service, which renders a draft folder
//! to a video file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;

#[async_trait::async_trait]
pub trait RenderService: Send + Sync {
    /// Render the draft and return the path of the produced video.
    async fn export(&self, draft_name: &str, draft_path: &Path) -> Result<PathBuf>;

    /// Fails when the service cannot take exports right now.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    draft_name: &'a str,
    draft_path: String,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    status: Option<String>,
    output_path: Option<String>,
    detail: Option<String>,
}

pub struct ExportClient {
    client: reqwest::Client,
    base_url: String,
    target_dir: Option<PathBuf>,
}

impl ExportClient {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ExportClient {
            client,
            base_url: config.export_url.trim_end_matches('/').to_string(),
            target_dir: config.target_dir.clone(),
        })
    }

    /// `GET /api/test`; true when the service answers with `status: success`.
    pub async fn check_service(&self) -> bool {
        let url = format!("{}/api/test", self.base_url);
        let response = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "export service health check failed");
                return false;
            }
            Err(e) => {
                warn!(error = %e, url, "export service unreachable");
                return false;
            }
        };
        match response.json::<ExportResponse>().await {
            Ok(body) => body.status.as_deref() == Some("success"),
            Err(_) => false,
        }
    }
}

#[async_trait::async_trait]
impl RenderService for ExportClient {
    async fn health_check(&self) -> Result<()> {
        anyhow::ensure!(
            self.check_service().await,
            "Export service at {} is not available",
            self.base_url
        );
        Ok(())
    }

    async fn export(&self, draft_name: &str, draft_path: &Path) -> Result<PathBuf> {
        let url = format!("{}/api/export_draft", self.base_url);
        info!(draft_name, "exporting draft (this can take a long time)");
        debug!(url, "export endpoint");

        let response = self
            .client
            .post(&url)
            .json(&ExportRequest {
                draft_name,
                draft_path: draft_path.to_string_lossy().into_owned(),
            })
            .send()
            .await
            .with_context(|| format!("Export request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ExportResponse>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .unwrap_or_else(|| format!("HTTP {}", status));
            anyhow::bail!("Export service error: {}", detail);
        }

        let body: ExportResponse = response
            .json()
            .await
            .context("Invalid export service response")?;
        let output_path = match (body.status.as_deref(), body.output_path) {
            (Some("success"), Some(path)) if !path.is_empty() => PathBuf::from(path),
            (status, _) => anyhow::bail!(
                "Export of {} did not succeed: status={:?} detail={:?}",
                draft_name,
                status,
                body.detail
            ),
        };
        info!(output = %output_path.display(), "draft exported");

        match &self.target_dir {
            Some(dir) => move_into(&output_path, dir).await,
            None => Ok(output_path),
        }
    }
}

/// Move `source` into `dir`, appending `_1`, `_2`, ... to the file stem when
/// the name is taken.
pub async fn move_into(source: &Path, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let file_name = source
        .file_name()
        .with_context(|| format!("{} has no file name", source.display()))?;
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut target = dir.join(file_name);
    let mut counter = 1;
    while tokio::fs::try_exists(&target).await.unwrap_or(false) {
        target = dir.join(format!("{stem}_{counter}{extension}"));
        counter += 1;
    }

    if tokio::fs::rename(source, &target).await.is_err() {
        // rename fails across filesystems
        tokio::fs::copy(source, &target)
            .await
            .with_context(|| format!("Failed to move {} to {}", source.display(), target.display()))?;
        tokio::fs::remove_file(source).await?;
    }
    info!(target = %target.display(), "rendered video moved");
    Ok(target)
}
