//! Error taxonomy for pipeline runs.
//!
//! Unit-level failures (environment setup, a single tool build) are recorded
//! as statuses by the executor and never surface here. What does surface is
//! fatal to the run: configuration errors, recipe upload failures, and
//! infrastructure failures such as an unreachable execution host.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A single configuration validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that abort a command.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("invalid build option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("recipe catalog: {0}")]
    Catalog(String),

    #[error("git: {0}")]
    Vcs(String),

    #[error("recipe upload failed: {0}")]
    RecipeUpload(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("another run is active for '{lineage}' (lock file {})", path.display())]
    RunInProgress { lineage: String, path: PathBuf },

    #[error("report error: {0}")]
    Report(String),

    #[error("merge upstream: {0}")]
    Merge(String),

    #[error("{0} tool build(s) failed")]
    BuildsFailed(usize),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole run rather than one unit.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Self::Infrastructure(_) | Self::RecipeUpload(_) | Self::RunInProgress { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_counts() {
        let err = Error::Validation(vec![
            ValidationError {
                message: "a".into(),
            },
            ValidationError {
                message: "b".into(),
            },
        ]);
        assert_eq!(err.to_string(), "2 validation error(s)");
    }

    #[test]
    fn test_io_display_includes_path() {
        let err = Error::io(
            "/tmp/missing.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.yaml"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Infrastructure("ssh".into()).is_fatal_to_run());
        assert!(Error::RecipeUpload("x".into()).is_fatal_to_run());
        assert!(!Error::UnknownPlatform("x".into()).is_fatal_to_run());
    }
}
