//! Error taxonomy for the harness.

use std::path::PathBuf;

/// Which layer an error belongs to.
///
/// Harness-layer errors abort the current test. Assertion-layer errors are
/// test failures; the validation runner scopes them to a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLayer {
    Harness,
    Assertion,
}

/// Errors produced by the harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("workspace setup failed for {path}: {reason}")]
    Setup { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "`{command}` failed after {attempts} attempt(s) with exit code {exit_code}\nOutput:\n{output}"
    )]
    ToolInvocation {
        command: String,
        exit_code: i32,
        attempts: u32,
        output: String,
    },

    #[error("output `{name}` not found (available: {available:?})")]
    MissingOutput {
        name: String,
        available: Vec<String>,
    },

    #[error("unexpected output: {message}")]
    UnexpectedOutput { message: String, output: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn setup(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        HarnessError::Setup {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        HarnessError::UnexpectedOutput {
            message: message.into(),
            output: String::new(),
        }
    }

    /// The layer this error is reported at.
    pub fn layer(&self) -> ErrorLayer {
        match self {
            HarnessError::MissingOutput { .. } | HarnessError::UnexpectedOutput { .. } => {
                ErrorLayer::Assertion
            }
            _ => ErrorLayer::Harness,
        }
    }

    /// Captured tool output attached to this error, if any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            HarnessError::ToolInvocation { output, .. }
            | HarnessError::UnexpectedOutput { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
