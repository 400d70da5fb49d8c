//! Error types of the command line tool.
//!
//! Pipeline failures are wrapped from [`crate::bundler::Error`]; this level adds
//! argument and configuration file errors and recovery suggestions.

use crate::bundler::ErrorCategory;
use thiserror::Error;

/// Result type alias for command line operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type of the command line tool
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pipeline errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            BundlerError::Cli(_) => vec!["Run with --help to see the accepted arguments".to_string()],
            BundlerError::Toml(_) => {
                vec!["Check the configuration file against the documented sections".to_string()]
            }
            BundlerError::Io(_) | BundlerError::Json(_) => {
                vec!["Check that the work and result directories are writable".to_string()]
            }
            BundlerError::Bundler(e) => match e.category() {
                ErrorCategory::Configuration => vec![
                    "Product names and target components only accept ASCII letters, digits and underscores".to_string(),
                    "Targets are written sdk-platform-arch, e.g. iOS-iOS_Simulator-arm64".to_string(),
                ],
                ErrorCategory::Integrity => vec![
                    "Verify the configured SHA-256 against the published checksum".to_string(),
                    "Partial downloads are discarded, simply run again once the server is reachable".to_string(),
                ],
                ErrorCategory::Toolchain => vec![
                    "The failing command and its output are shown above".to_string(),
                    "Run with RUST_LOG=debug to stream every tool's output".to_string(),
                ],
                ErrorCategory::Consistency => vec![
                    "Check that the dependency XCFramework covers every configured target".to_string(),
                    "Run with --clean to discard stale intermediate artifacts".to_string(),
                ],
                ErrorCategory::Io => {
                    vec!["Check free disk space and permissions of the work directory".to_string()]
                }
            },
        }
    }

    /// Whether running again without changes may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BundlerError::Io(_) | BundlerError::Bundler(crate::bundler::Error::Http(_))
        ) || matches!(self, BundlerError::Bundler(e) if e.category() == ErrorCategory::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_follow_category() {
        let err = BundlerError::from(crate::bundler::Error::EmptyManifest);
        assert!(
            err.recovery_suggestions()
                .iter()
                .any(|s| s.contains("--clean"))
        );
        assert!(!err.is_recoverable());

        let err = BundlerError::from(crate::bundler::Error::InvalidIdentifier {
            kind: "product name",
            value: "a-b".into(),
        });
        assert!(err.to_string().contains("invalid product name"));
    }
}
