//! Workflow Execution Module
//!
//! Provides the core execution engine for running workflows over a JSON
//! document, including Map fan-out, Parallel fan-in, retry with backoff,
//! and cooperative cancellation.
//!
//! # Architecture
//!
//! - [`engine`]: Main execution engine driving the state-by-state loop
//! - [`task`]: Task state evaluation (invoke, timeout, retry, catch)
//! - [`map`]: Map composer fanning an iterator state out over a list
//! - [`parallel`]: Parallel composer running branch sub-workflows
//! - [`history`]: Ordered record of state visits and outcomes

pub mod engine;
pub mod history;
pub mod map;
pub mod parallel;
pub mod task;

pub use engine::{CancelHandle, Engine, EngineConfig, Execution, ExecutionResult, ExecutionStatus};
pub use history::{ExecutionHistory, HistoryRecord, StateOutcome};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::document::PathError;
use crate::invoker::InvokeError;

/// Classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A data path referenced a key or index the document does not contain
    PathNotFound,
    /// A path traversed or injected into a value of the wrong shape
    TypeMismatch,
    /// An operation rejected its input
    OperationError,
    /// An operation did not answer within its deadline
    Timeout,
    /// An operation endpoint could not be reached
    Unreachable,
    /// A Map iteration or Parallel branch failed
    CompositionFailure,
    /// The execution was cancelled before reaching a terminal state
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PathNotFound => "path not found",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::OperationError => "operation error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::CompositionFailure => "composition failure",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Why an execution failed: the state where the failure originated, the
/// failure class, and a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("state '{state_id}' failed ({kind}): {message}")]
pub struct FailureCause {
    pub state_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureCause {
    /// Creates a failure cause for the given state.
    pub fn new(state_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            state_id: state_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Converts a document path error into a failure cause.
    pub(crate) fn from_path(state_id: &str, err: PathError) -> Self {
        let kind = match err {
            PathError::NotFound(_) => ErrorKind::PathNotFound,
            _ => ErrorKind::TypeMismatch,
        };
        Self::new(state_id, kind, err.to_string())
    }

    /// Converts a task invocation error into a failure cause.
    pub(crate) fn from_invoke(state_id: &str, err: &InvokeError) -> Self {
        let kind = match err {
            InvokeError::Timeout(_) => ErrorKind::Timeout,
            InvokeError::Unreachable(_) => ErrorKind::Unreachable,
            InvokeError::Operation { .. } => ErrorKind::OperationError,
        };
        Self::new(state_id, kind, err.to_string())
    }

    /// Failure cause for a cancelled execution.
    pub(crate) fn cancelled(state_id: &str) -> Self {
        Self::new(state_id, ErrorKind::Cancelled, "execution cancelled")
    }
}

/// What evaluating one state produced.
///
/// Failures travel separately as [`FailureCause`] in the `Err` arm.
#[derive(Debug, Clone)]
pub(crate) enum EvalOutcome {
    /// The state completed; `next` names the state to enter, or `None`
    /// when the enclosing machine ends successfully with `doc`.
    Next {
        doc: serde_json::Value,
        next: Option<String>,
    },
    /// An explicit Succeed state ended the machine with `output`.
    Succeeded { output: serde_json::Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_cause_display() {
        let cause = FailureCause::new("CheckStock", ErrorKind::Timeout, "no answer in 200ms");
        assert_eq!(
            cause.to_string(),
            "state 'CheckStock' failed (timeout): no answer in 200ms"
        );
    }

    #[test]
    fn test_path_error_kinds() {
        let not_found = FailureCause::from_path("A", PathError::NotFound("$.missing".to_string()));
        assert_eq!(not_found.kind, ErrorKind::PathNotFound);

        let mismatch = FailureCause::from_path(
            "A",
            PathError::TypeMismatch {
                path: "$.order".to_string(),
                expected: "array",
                found: "string",
            },
        );
        assert_eq!(mismatch.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_invoke_error_kinds() {
        let unreachable =
            FailureCause::from_invoke("A", &InvokeError::Unreachable("refused".to_string()));
        assert_eq!(unreachable.kind, ErrorKind::Unreachable);

        let timeout = FailureCause::from_invoke(
            "A",
            &InvokeError::Timeout(std::time::Duration::from_millis(50)),
        );
        assert_eq!(timeout.kind, ErrorKind::Timeout);
    }
}
