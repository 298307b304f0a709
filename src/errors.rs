use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream answered with status {0}")]
    NonSuccessStatus(u16),

    #[error("Cache storage failure: {0}")]
    CacheStorageFailure(String),

    #[error("Install finished with {0} failed asset(s)")]
    InstallPartialFailure(usize),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),
}

impl warp::reject::Reject for CacheError {}
