use thiserror::Error;

use crate::Capability;

/// Failure categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    MissingCapability,
    ComputationFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::MissingCapability => "missing capability",
            ErrorKind::ComputationFailure => "computation failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing capability: the {0} backend is not compiled in")]
    MissingCapability(Capability),
    #[error("Computation failed: {0}")]
    ComputationFailure(String),
}

impl NoppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        NoppError::InvalidInput(message.into())
    }

    pub fn computation(message: impl Into<String>) -> Self {
        NoppError::ComputationFailure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NoppError::InvalidInput(_) => ErrorKind::InvalidInput,
            NoppError::MissingCapability(_) => ErrorKind::MissingCapability,
            NoppError::ComputationFailure(_) => ErrorKind::ComputationFailure,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            NoppError::InvalidInput(msg) | NoppError::ComputationFailure(msg) => msg.clone(),
            NoppError::MissingCapability(cap) => format!("{} backend is not compiled in", cap),
        }
    }
}

pub type NoppResult<T> = Result<T, NoppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = NoppError::invalid_input("image is empty");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.message(), "image is empty");
        assert_eq!(err.to_string(), "Invalid input: image is empty");

        let err = NoppError::MissingCapability(Capability::Wavelet);
        assert_eq!(err.kind(), ErrorKind::MissingCapability);
        assert!(err.to_string().contains("wavelet"));
    }
}
