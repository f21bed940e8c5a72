use std::time::Duration;

use thiserror::Error;

/// Errors that escape a rating request.
///
/// Everything downstream of the primary product's own score is absorbed
/// inside the pipeline, so this enum stays small on purpose.
#[derive(Debug, Error)]
pub enum EcoError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rating service unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Model returned invalid JSON: {0}")]
    OracleMalformed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    Http(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl EcoError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
