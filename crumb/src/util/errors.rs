use std::io::ErrorKind;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CustomError {
    #[error("browser's return value doesn't match the standard, {message}")]
    StandardMismatch { message: String },
    #[error("failed to query frames of tab {tab_id}")]
    FailedFrameQuery { tab_id: i32 },
    #[error("failed to clean up `{hostname}`: {message}")]
    FailedCleanup { hostname: String, message: String },

    #[error("invalid rule expression `{expression}`, {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("no container named `{name}`")]
    UnknownContainer { name: String },
    #[error(transparent)]
    InvalidDomain { #[from] source: idna::Errors },
    #[error("invalid suffix format `{suffix}`")]
    InvalidSuffix { suffix: String },
    #[error("failed to read public suffix list, {0:?}")]
    IoError(ErrorKind),
}
