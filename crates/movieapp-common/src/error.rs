//! Error types and classification codes for movieapp
//!
//! This module defines:
//! - `Code`: failure classification, mapped one-to-one onto gRPC status codes
//! - `MovieAppError`: application error enum, one variant per classification

use std::fmt::{Display, Formatter};

/// Failure classification shared by every service.
///
/// Retry decisions are keyed on this value, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    NotFound,
    InvalidArgument,
    Unauthenticated,
    ResourceExhausted,
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    Internal,
}

impl Code {
    /// Classifications that may succeed when the call is repeated
    pub const TRANSIENT: [Code; 3] = [
        Code::DeadlineExceeded,
        Code::ResourceExhausted,
        Code::Unavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Code::NotFound => "not_found",
            Code::InvalidArgument => "invalid_argument",
            Code::Unauthenticated => "unauthenticated",
            Code::ResourceExhausted => "resource_exhausted",
            Code::Unavailable => "unavailable",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::Cancelled => "cancelled",
            Code::Internal => "internal",
        }
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tonic::Code> for Code {
    fn from(value: tonic::Code) -> Self {
        match value {
            tonic::Code::NotFound => Code::NotFound,
            tonic::Code::InvalidArgument => Code::InvalidArgument,
            tonic::Code::Unauthenticated => Code::Unauthenticated,
            tonic::Code::ResourceExhausted => Code::ResourceExhausted,
            tonic::Code::Unavailable => Code::Unavailable,
            tonic::Code::DeadlineExceeded => Code::DeadlineExceeded,
            tonic::Code::Cancelled => Code::Cancelled,
            _ => Code::Internal,
        }
    }
}

impl From<Code> for tonic::Code {
    fn from(value: Code) -> Self {
        match value {
            Code::NotFound => tonic::Code::NotFound,
            Code::InvalidArgument => tonic::Code::InvalidArgument,
            Code::Unauthenticated => tonic::Code::Unauthenticated,
            Code::ResourceExhausted => tonic::Code::ResourceExhausted,
            Code::Unavailable => tonic::Code::Unavailable,
            Code::DeadlineExceeded => tonic::Code::DeadlineExceeded,
            Code::Cancelled => tonic::Code::Cancelled,
            Code::Internal => tonic::Code::Internal,
        }
    }
}

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MovieAppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MovieAppError>;

impl MovieAppError {
    /// Build an error from a classification and a message
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Code::NotFound => MovieAppError::NotFound(message),
            Code::InvalidArgument => MovieAppError::InvalidArgument(message),
            Code::Unauthenticated => MovieAppError::Unauthenticated(message),
            Code::ResourceExhausted => MovieAppError::ResourceExhausted(message),
            Code::Unavailable => MovieAppError::Unavailable(message),
            Code::DeadlineExceeded => MovieAppError::DeadlineExceeded(message),
            Code::Cancelled => MovieAppError::Cancelled(message),
            Code::Internal => MovieAppError::Internal(message),
        }
    }

    pub fn code(&self) -> Code {
        match self {
            MovieAppError::NotFound(_) => Code::NotFound,
            MovieAppError::InvalidArgument(_) => Code::InvalidArgument,
            MovieAppError::Unauthenticated(_) => Code::Unauthenticated,
            MovieAppError::ResourceExhausted(_) => Code::ResourceExhausted,
            MovieAppError::Unavailable(_) => Code::Unavailable,
            MovieAppError::DeadlineExceeded(_) => Code::DeadlineExceeded,
            MovieAppError::Cancelled(_) => Code::Cancelled,
            MovieAppError::Internal(_) => Code::Internal,
        }
    }

    /// The message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            MovieAppError::NotFound(m)
            | MovieAppError::InvalidArgument(m)
            | MovieAppError::Unauthenticated(m)
            | MovieAppError::ResourceExhausted(m)
            | MovieAppError::Unavailable(m)
            | MovieAppError::DeadlineExceeded(m)
            | MovieAppError::Cancelled(m)
            | MovieAppError::Internal(m) => m,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }
}

impl From<tonic::Status> for MovieAppError {
    fn from(status: tonic::Status) -> Self {
        MovieAppError::new(status.code().into(), status.message())
    }
}

impl From<MovieAppError> for tonic::Status {
    fn from(err: MovieAppError) -> Self {
        tonic::Status::new(err.code().into(), err.message())
    }
}
