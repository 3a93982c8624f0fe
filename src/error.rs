//! Error types for scan operations.
//!
//! Policy violations are not errors; see [`crate::policy::PolicyViolation`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// A project manifest could not be read or parsed.
    #[error("failed to load project {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// A vulnerability source failed to answer.
    #[error("vulnerability source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A report sink could not be written.
    #[error("failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is unreadable, malformed, or could not be initialized.
    #[error("invalid settings {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ScanError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ScanError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn settings(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScanError::Settings {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ScanError::load("app/vulngate.deps", "line 3: missing version");
        assert_eq!(
            err.to_string(),
            "failed to load project app/vulngate.deps: line 3: missing version"
        );

        let err = ScanError::source_unavailable("OSV.dev", "connection refused");
        assert_eq!(
            err.to_string(),
            "vulnerability source 'OSV.dev' is unavailable: connection refused"
        );
    }
}
