use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories surfaced to the host with every rejected job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedFormat,
    IoFailure,
    ToolFailure,
    InternalFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::IoFailure => "IOFailure",
            ErrorKind::ToolFailure => "ToolFailure",
            ErrorKind::InternalFault => "InternalFault",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SlidemixError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Staging(String),

    #[error("{0}")]
    Tool(String),

    #[error("{0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SlidemixError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SlidemixError::InvalidInput(_) | SlidemixError::Config(_) => ErrorKind::InvalidInput,
            SlidemixError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            SlidemixError::Io(_) | SlidemixError::Staging(_) => ErrorKind::IoFailure,
            SlidemixError::Tool(_) => ErrorKind::ToolFailure,
            SlidemixError::Internal(_) => ErrorKind::InternalFault,
        }
    }

    /// Prefix the message with the step that failed, keeping the kind.
    pub fn context<S: fmt::Display>(self, what: S) -> Self {
        let kind = self.kind();
        let message = format!("{}: {}", what, self);
        match kind {
            ErrorKind::InvalidInput => SlidemixError::InvalidInput(message),
            ErrorKind::UnsupportedFormat => SlidemixError::UnsupportedFormat(message),
            ErrorKind::IoFailure => SlidemixError::Staging(message),
            ErrorKind::ToolFailure => SlidemixError::Tool(message),
            ErrorKind::InternalFault => SlidemixError::Internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, SlidemixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_io_failures() {
        let err: SlidemixError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = SlidemixError::Tool("exit status 1".to_string()).context("Video assembly");
        assert_eq!(err.kind(), ErrorKind::ToolFailure);
        assert!(err.to_string().contains("Video assembly"));
        assert!(err.to_string().contains("exit status 1"));
    }
}
