//! Error types for dynotool

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DynoError>;

/// Service error codes that signal admission control rather than failure.
pub const RETRYABLE_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

#[derive(Error, Debug)]
pub enum DynoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported attribute tag `{0}`")]
    UnsupportedTag(String),

    #[error("Record cannot be encoded: {0}")]
    Encoding(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{table}' did not reach {target} after {polls} polls")]
    TableCreationTimeout {
        table: String,
        target: String,
        polls: u32,
    },

    #[error("Request throttled ({code}): {message}")]
    Throttled { code: String, message: String },

    #[error("{operation} still throttled after {attempts} retries (last delay {last_delay:?})")]
    RetryLimitExceeded {
        operation: String,
        attempts: u32,
        last_delay: Duration,
    },

    #[error("Operation declined at confirmation prompt")]
    ConfirmationDeclined,

    #[error("{operation} failed ({code}): {message}")]
    Service {
        operation: String,
        code: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Delimited output error: {0}")]
    Csv(#[from] csv::Error),
}

impl DynoError {
    /// Build a service error, classifying admission-control codes as `Throttled`.
    pub fn from_service(operation: &str, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(code) if RETRYABLE_CODES.contains(&code) => DynoError::Throttled {
                code: code.to_string(),
                message,
            },
            code => DynoError::Service {
                operation: operation.to_string(),
                code: code.unwrap_or("Unknown").to_string(),
                message,
            },
        }
    }

    /// Admission-control rejections are retried with backoff, never surfaced directly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DynoError::Throttled { .. })
    }

    /// True for a service-side "resource not found" answer.
    pub fn is_not_found(&self) -> bool {
        match self {
            DynoError::TableNotFound(_) => true,
            DynoError::Service { code, .. } => code == "ResourceNotFoundException",
            _ => false,
        }
    }

    /// Get error code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            DynoError::InvalidArgument(_) => "INVALID_ARGUMENT",
            DynoError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            DynoError::UnsupportedTag(_) => "UNSUPPORTED_TAG",
            DynoError::Encoding(_) => "ENCODING_ERROR",
            DynoError::MalformedRecord { .. } => "MALFORMED_RECORD",
            DynoError::TableNotFound(_) => "TABLE_NOT_FOUND",
            DynoError::TableExists(_) => "TABLE_EXISTS",
            DynoError::TableCreationTimeout { .. } => "TABLE_CREATION_TIMEOUT",
            DynoError::Throttled { .. } => "THROTTLED",
            DynoError::RetryLimitExceeded { .. } => "RETRY_LIMIT_EXCEEDED",
            DynoError::ConfirmationDeclined => "CONFIRMATION_DECLINED",
            DynoError::Config(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            DynoError::InvalidArgument(_) | DynoError::Config(_) => 2,
            DynoError::UnsupportedFormat(_) => 3,
            DynoError::TableCreationTimeout { .. } => 4,
            DynoError::UnsupportedTag(_)
            | DynoError::Encoding(_)
            | DynoError::MalformedRecord { .. } => 5,
            DynoError::TableExists(_) => 6,
            DynoError::TableNotFound(_) => 7,
            DynoError::RetryLimitExceeded { .. } => 8,
            DynoError::ConfirmationDeclined => 9,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_codes_are_retryable() {
        for code in RETRYABLE_CODES {
            let err = DynoError::from_service("Scan", Some(code), "slow down");
            assert!(err.is_retryable(), "{} should be retryable", code);
        }
    }

    #[test]
    fn test_validation_error_is_fatal() {
        let err = DynoError::from_service("BatchWriteItem", Some("ValidationException"), "bad key");
        assert!(!err.is_retryable());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("ValidationException"));
    }

    #[test]
    fn test_not_found_detection() {
        let err = DynoError::from_service("DescribeTable", Some("ResourceNotFoundException"), "nope");
        assert!(err.is_not_found());
        assert!(DynoError::TableNotFound("a".into()).is_not_found());
        assert!(!DynoError::TableExists("a".into()).is_not_found());
    }

    #[test]
    fn test_exit_codes_are_distinct_for_preconditions() {
        let codes = [
            DynoError::InvalidArgument("x".into()).exit_code(),
            DynoError::UnsupportedFormat("x".into()).exit_code(),
            DynoError::TableCreationTimeout {
                table: "t".into(),
                target: "ACTIVE".into(),
                polls: 50,
            }
            .exit_code(),
            DynoError::Encoding("x".into()).exit_code(),
            DynoError::TableExists("t".into()).exit_code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|c| *c != 0));
    }
}
