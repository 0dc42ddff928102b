use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed timestamp `{text}` (expected HH:MM:SS,mmm)")]
    MalformedTime { text: String },

    #[error("dialogue {index}: {what} has zero duration")]
    ZeroDuration { index: u32, what: &'static str },

    #[error("missing artifact at `{0}`")]
    MissingArtifact(PathBuf),

    #[error("dialogue {index} alone lasts {duration_seconds:.2}s, above the {max_seconds:.2}s chunk limit")]
    UnsplittableSegment {
        index: u32,
        duration_seconds: f64,
        max_seconds: f64,
    },

    #[error("dialogue {index}: span end {end} is not after start {start}")]
    InvalidSpan { index: u32, start: i64, end: i64 },

    #[error("story `{0}` has no usable dialogues")]
    EmptyStory(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn malformed(text: impl Into<String>) -> Self {
        EngineError::MalformedTime { text: text.into() }
    }

    /// Per-dialogue errors are skipped at the story level; everything else aborts.
    pub fn is_dialogue_scoped(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedTime { .. }
                | EngineError::ZeroDuration { .. }
                | EngineError::MissingArtifact(_)
                | EngineError::UnsplittableSegment { .. }
                | EngineError::InvalidSpan { .. }
        )
    }
}
