//! Error types for router reconciliation.
//!
//! This module defines the error types used throughout the router crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors that can occur while reconciling router state.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Own-side relation data is missing or malformed at join time.
    #[error("Configuration error for {field}: {message}")]
    Configuration {
        /// The field that is missing or malformed.
        field: String,
        /// Error message.
        message: String,
    },

    /// Relation data failed CIDR/IP/JSON validation.
    #[error("Validation error for {field} '{value}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The offending value.
        value: String,
        /// Error message.
        message: String,
    },

    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Event name not understood by the reconciler.
    #[error("Unknown relation event '{event}'")]
    UnknownEvent {
        /// The event name as received.
        event: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl RouterError {
    /// Creates a configuration error.
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the networking layer rejected the operation.
    ///
    /// Such failures are not retried here; the next delivery of a
    /// relation event for the same unit re-runs the reconciliation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::ShellExec { .. } | RouterError::ShellCommandFailed { .. }
        )
    }

    /// Returns true if the error stems from bad relation data.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RouterError::Configuration { .. } | RouterError::Validation { .. }
        )
    }
}
