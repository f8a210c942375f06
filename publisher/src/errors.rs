use crate::config::ValidationError;
use crate::teamcity::TeamCityError;
use collector::CollectorError;
use thiserror::Error;

/// Result type alias for publisher operations
pub type Result<T, E = PublisherError> = std::result::Result<T, E>;

/// Errors that can occur while preparing or publishing a report
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("metric collection failed: {0}")]
    Collector(#[from] CollectorError),

    #[error("TeamCity error: {0}")]
    TeamCity(#[from] TeamCityError),

    #[error("could not serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
