use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmythError {
    #[error("Invalid timecode: {0}")]
    Format(String),

    #[error("Malformed SRT block {block}: {reason}")]
    Parse { block: usize, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported project version {0}")]
    UnsupportedProjectVersion(u32),

    #[error("No cue with index {0}")]
    NoSuchCue(u32),

    #[error("Subtitle not parsed yet: {0}")]
    NotParsed(String),

    #[error("No project selected")]
    NoProjectSelected,

    #[error("No file opened")]
    NoFileOpened,

    #[error("Parse task for {path:?} did not complete: {reason}")]
    ParseTask { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl SubmythError {
    pub(crate) fn parse(block: usize, reason: impl Into<String>) -> Self {
        SubmythError::Parse {
            block,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SubmythError>;
