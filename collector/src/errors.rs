use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = CollectorError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse telemetry json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid meter sample in {}:{line}: {reason}", file.display())]
    MeterParse {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("span `{span}` was not exported to {} within {timeout_secs}s", file.display())]
    SpansNotExported {
        span: String,
        file: PathBuf,
        timeout_secs: u64,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
