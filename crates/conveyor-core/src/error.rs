//! Error types for Conveyor

use std::fmt;
use thiserror::Error;

/// Result type alias using Conveyor's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Conveyor operations
#[derive(Error, Debug)]
pub enum Error {
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

/// Reserved payload field that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadField {
    Name,
    Id,
    Meta,
}

impl PayloadField {
    /// Key used for this field in the wire payload
    pub fn key(&self) -> &'static str {
        match self {
            PayloadField::Name => "name",
            PayloadField::Id => "id",
            PayloadField::Meta => "meta",
        }
    }
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What was wrong with a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    /// The key is missing (or null)
    Absent,
    /// The key is present but holds an empty string
    Empty,
    /// The key holds a value of the wrong kind
    WrongType { expected: &'static str },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Absent => f.write_str("missing"),
            FieldProblem::Empty => f.write_str("empty"),
            FieldProblem::WrongType { expected } => write!(f, "not a {}", expected),
        }
    }
}

/// Errors raised while turning a raw broker body into a job descriptor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// The body could not be parsed, or is not a keyed structure
    #[error("payload is not a keyed structure: {reason}")]
    Malformed { reason: String },

    /// A required field is missing, or `meta` is present but invalid
    #[error("payload field `{field}` is {problem}")]
    MissingField {
        field: PayloadField,
        problem: FieldProblem,
    },
}

impl PayloadError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PayloadError::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: PayloadField, problem: FieldProblem) -> Self {
        PayloadError::MissingField { field, problem }
    }

    /// Field that failed validation, if this is a field error
    pub fn field(&self) -> Option<PayloadField> {
        match self {
            PayloadError::MissingField { field, .. } => Some(*field),
            PayloadError::Malformed { .. } => None,
        }
    }

    /// Check if the payload was rejected as a whole
    pub fn is_malformed(&self) -> bool {
        matches!(self, PayloadError::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message_names_field() {
        let err = PayloadError::missing(PayloadField::Meta, FieldProblem::Empty);
        assert_eq!(err.to_string(), "payload field `meta` is empty");
        assert_eq!(err.field(), Some(PayloadField::Meta));
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_wrong_type_message() {
        let err = PayloadError::missing(PayloadField::Id, FieldProblem::WrongType { expected: "scalar" });
        assert_eq!(err.to_string(), "payload field `id` is not a scalar");
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }
}
