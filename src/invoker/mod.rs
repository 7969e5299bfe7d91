//! Task Invoker Module
//!
//! Boundary abstraction for calling named external operations with a JSON
//! input. The engine only ever sees this trait, so tests substitute
//! deterministic fakes and deployments plug in whatever transport they use.
//!
//! # Components
//!
//! - [`TaskInvoker`]: the injected capability interface
//! - [`InvokeError`] / [`OperationCode`]: the failure vocabulary
//! - [`InMemoryStore`]: in-process store operations for the order workflow

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod store;

pub use store::{InMemoryStore, CHECK_STOCK, CREATE_ORDER, CREATE_STORE_ITEM, UPDATE_STOCK};

/// Business-level rejection codes an operation may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationCode {
    NotFound,
    Conflict,
    ValidationError,
    Internal,
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationCode::NotFound => "NotFound",
            OperationCode::Conflict => "Conflict",
            OperationCode::ValidationError => "ValidationError",
            OperationCode::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

/// Failure of a single operation invocation.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The call exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation ran and rejected the request
    #[error("operation rejected ({code}): {message}")]
    Operation {
        code: OperationCode,
        message: String,
    },

    /// The operation could not be reached at all
    #[error("operation unreachable: {0}")]
    Unreachable(String),
}

impl InvokeError {
    /// Returns true for failures the retry policy may retry.
    /// Business rejections are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Timeout(_) | InvokeError::Unreachable(_))
    }
}

/// Boxed future returned by [`TaskInvoker::invoke`].
pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, InvokeError>> + Send + 'a>>;

/// Calls one named external operation with a JSON input.
///
/// Implementations are shared across concurrent executions and must be
/// stateless per call (connection pooling aside). The engine makes no
/// idempotency assumption: a retried task may re-execute a side-effecting
/// operation, so operations requiring exactly-once effects must deduplicate
/// internally.
pub trait TaskInvoker: Send + Sync {
    /// Invokes `operation` with `input`, returning its JSON output.
    fn invoke<'a>(&'a self, operation: &'a str, input: Value) -> InvokeFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(InvokeError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(InvokeError::Unreachable("dns".to_string()).is_transient());
        assert!(!InvokeError::Operation {
            code: OperationCode::Conflict,
            message: "out of stock".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = InvokeError::Operation {
            code: OperationCode::NotFound,
            message: "no such sku".to_string(),
        };
        assert_eq!(err.to_string(), "operation rejected (NotFound): no such sku");
    }
}
