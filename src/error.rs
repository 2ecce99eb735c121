use std::fmt;

use thiserror::Error;
use tonic::{Code, Status};

/// Coarse classification of a failed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The remote rejected the input, e.g. a validation failure.
    InvalidArgument,
    /// The call deadline elapsed before the call completed.
    DeadlineExceeded,
    /// Connection or transport failure.
    Unavailable,
    /// The API was misused, e.g. sending after half-close.
    InvalidState,
    /// The caller cancelled the call.
    Cancelled,
    /// Unclassified remote failure.
    Unknown,
}

impl StatusKind {
    /// Status code used when the kind has to travel back over gRPC.
    #[must_use]
    pub fn code(self) -> Code {
        match self {
            Self::InvalidArgument => Code::InvalidArgument,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::Unavailable => Code::Unavailable,
            Self::InvalidState => Code::FailedPrecondition,
            Self::Cancelled => Code::Cancelled,
            Self::Unknown => Code::Unknown,
        }
    }
}

impl From<Code> for StatusKind {
    fn from(code: Code) -> Self {
        match code {
            Code::InvalidArgument => Self::InvalidArgument,
            Code::DeadlineExceeded => Self::DeadlineExceeded,
            Code::Unavailable => Self::Unavailable,
            Code::Cancelled => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid argument",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Unavailable => "unavailable",
            Self::InvalidState => "invalid state",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a call: a status kind plus the message that came with it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StatusError {
    kind: StatusKind,
    message: String,
}

impl StatusError {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusKind::DeadlineExceeded, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Unavailable, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidState, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Unknown, message)
    }

    #[must_use]
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Status> for StatusError {
    fn from(status: Status) -> Self {
        Self::new(status.code().into(), status.message())
    }
}

impl From<tonic::transport::Error> for StatusError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::unavailable(err.to_string())
    }
}

/// Errors surfaced by the client binary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid config file. Error: {0}")]
    InvalidConfigFile(String),

    #[error("Failed to read CA file: {0}")]
    InvalidCaFile(std::io::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Invalid gRPC endpoint URI: {0}")]
    InvalidUri(String),

    #[error("Logger setup failed: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("Call failed with {0}")]
    Call(#[from] StatusError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err: StatusError = Status::invalid_argument("Received a negative number: -2").into();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
        assert_eq!(err.message(), "Received a negative number: -2");

        let err: StatusError = Status::deadline_exceeded("too slow").into();
        assert_eq!(err.kind(), StatusKind::DeadlineExceeded);

        let err: StatusError = Status::unavailable("connection refused").into();
        assert_eq!(err.kind(), StatusKind::Unavailable);

        let err: StatusError = Status::cancelled("client went away").into();
        assert_eq!(err.kind(), StatusKind::Cancelled);

        for status in [
            Status::internal("boom"),
            Status::not_found("nope"),
            Status::permission_denied("no"),
            Status::unimplemented("later"),
        ] {
            assert_eq!(StatusError::from(status).kind(), StatusKind::Unknown);
        }
    }

    #[test]
    fn test_kind_code_mapping() {
        for kind in [
            StatusKind::InvalidArgument,
            StatusKind::DeadlineExceeded,
            StatusKind::Unavailable,
            StatusKind::Cancelled,
            StatusKind::Unknown,
        ] {
            assert_eq!(StatusKind::from(kind.code()), kind);
        }
        assert_eq!(StatusKind::InvalidState.code(), Code::FailedPrecondition);
    }

    #[test]
    fn test_display() {
        let err = StatusError::invalid_state("send after half-close");
        assert_eq!(err.to_string(), "invalid state: send after half-close");
    }
}
