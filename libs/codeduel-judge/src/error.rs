//! Infrastructure failures.
//!
//! Anything that goes wrong with the submitted code itself is recorded inside
//! `ExecutionResult`; the types here describe the execution mechanism failing,
//! which callers must never score as a zero.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid execution config: {0}")]
    InvalidConfig(String),
    #[error("Sandbox provisioning failed: {0}")]
    Provisioning(String),
    #[error("Docker operation failed: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("Judge backend unreachable: {0}")]
    Unreachable(String),
    #[error("Judge backend rate limited the request")]
    RateLimited,
    #[error("Judge backend error: {0}")]
    Provider(String),
    #[error("Judge backend did not finish within {0}ms")]
    Timeout(u64),
    #[error("Execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::Provisioning(_)
                | ExecutionError::Docker(_)
                | ExecutionError::Unreachable(_)
                | ExecutionError::RateLimited
        )
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        ExecutionError::Unreachable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Infrastructure failure on test {test_index}: {source}")]
    Infrastructure {
        test_index: usize,
        #[source]
        source: ExecutionError,
    },
    #[error("Judging cancelled")]
    Cancelled,
}
