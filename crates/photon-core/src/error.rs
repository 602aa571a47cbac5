//! Error types module
//!
//! All application-facing errors are unified under the `AppError` enum. Storage
//! crates convert their own error types into it at the service boundary.

use std::io;

/// Severity used when an `AppError` is logged at the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Tenant-fixable problems (bad settings, missing keys)
    Debug,
    /// Degraded but recoverable
    Warn,
    /// Backend or internal failures
    Error,
}

/// How an error is presented to API clients and logs
pub trait ErrorMetadata {
    /// Status for the HTTP response
    fn http_status_code(&self) -> u16;

    /// Stable code, e.g. `STORAGE_CONFIGURATION_ERROR`
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Message safe to show a tenant; backend details are withheld
    fn client_message(&self) -> String;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage configuration error: {0}")]
    StorageConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error: {message}")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("filesystem: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("Malformed JSON: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::Storage(_) => (502, "STORAGE_ERROR", true, LogLevel::Error),
        AppError::StorageConfiguration(_) => {
            (400, "STORAGE_CONFIGURATION_ERROR", false, LogLevel::Debug)
        }
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, LogLevel::Debug),
        AppError::BadRequest(_) => (400, "BAD_REQUEST", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Display string followed by up to five `Caused by:` lines from the source chain.
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Storage(_) => "Failed to access storage".to_string(),
            // Configuration messages name the offending field so tenant admins can fix it
            AppError::StorageConfiguration(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::BadRequest(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_hide_details_from_clients() {
        let err = AppError::Storage("connection reset by peer".to_string());
        assert_eq!(err.http_status_code(), 502);
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access storage");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn configuration_errors_name_the_field() {
        let err = AppError::StorageConfiguration(
            "Active S3 storage provider is missing `bucket`.".to_string(),
        );
        assert_eq!(err.http_status_code(), 400);
        assert!(!err.is_recoverable());
        assert!(err.client_message().contains("`bucket`"));
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn missing_object_is_404() {
        let err = AppError::NotFound("File not found: 2024/a.jpg".to_string());
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.client_message(), "File not found: 2024/a.jpg");
    }

    #[test]
    fn io_errors_count_as_storage_failures() {
        let err = AppError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn detailed_message_walks_the_source_chain() {
        let err = AppError::from(anyhow::anyhow!("bucket unreachable").context("listing tenant files"));
        let details = err.detailed_message();
        assert!(details.starts_with("Internal error: listing tenant files"));
        assert!(details.contains("Caused by:"));
    }
}
