use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{RetryReason, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorCode {
    /// Everything but `Internal` is recoverable by the requesting session.
    pub fn status(self) -> Status {
        match self {
            ErrorCode::Validation | ErrorCode::NotFound | ErrorCode::Conflict => Status::Retry,
            ErrorCode::Internal => Status::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RetryReason>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: None,
        }
    }

    pub fn retry(code: ErrorCode, reason: RetryReason, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: Some(reason),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn status(&self) -> Status {
        self.code.status()
    }
}
