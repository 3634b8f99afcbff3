//! Task processing status.

use crate::error::RouterError;

/// Outcome of handling a single relation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Event handled and all entries applied
    Success,
    /// Event handled, but some entries were rejected
    PartialSuccess,
    /// Event rejected due to invalid relation data
    InvalidEntry,
    /// Event failed (generic)
    Failed,
    /// Networking layer rejected the change; a later delivery retries
    NeedRetry,
    /// Event had nothing to do
    Ignore,
}

impl TaskStatus {
    /// Returns true if the event completed without a hard failure.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::PartialSuccess | TaskStatus::Ignore
        )
    }

    /// Returns true if the event may succeed on a later delivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }

    /// Returns true if the event failed permanently.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::InvalidEntry | TaskStatus::Failed)
    }

    /// Classifies an error into a status.
    pub fn from_error(err: &RouterError) -> Self {
        if err.is_invalid_input() {
            TaskStatus::InvalidEntry
        } else if err.is_retryable() {
            TaskStatus::NeedRetry
        } else {
            TaskStatus::Failed
        }
    }

    /// Returns a lowercase label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::PartialSuccess => "partial_success",
            TaskStatus::InvalidEntry => "invalid_entry",
            TaskStatus::Failed => "failed",
            TaskStatus::NeedRetry => "need_retry",
            TaskStatus::Ignore => "ignore",
        }
    }
}
