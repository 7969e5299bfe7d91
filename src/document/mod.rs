//! Execution Document Module
//!
//! Provides path-addressed access to the JSON execution document that flows
//! through a workflow.
//!
//! # Components
//!
//! - [`DataPath`]: parsed path expressions (`$.order[0].sku`, `$$.item`)
//! - [`resolve`] / [`inject`]: fail-fast reads and container-creating writes
//! - [`IterationContext`]: the reserved `$$` namespace for Map iterations

use thiserror::Error;

pub mod path;
pub mod resolver;

pub use path::{DataPath, PathRoot, Segment};
pub use resolver::{inject, resolve, IterationContext};
pub(crate) use resolver::type_name;

/// Errors raised while parsing or applying path expressions.
///
/// These indicate a malformed document or definition and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The expression could not be parsed
    #[error("malformed path expression '{0}'")]
    Malformed(String),

    /// A required location is absent from the document
    #[error("path '{0}' not found in document")]
    NotFound(String),

    /// A segment traversed a value of the wrong shape
    #[error("path '{path}' expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A `$$` path was used outside a Map iteration
    #[error("path '{0}' requires an iteration context")]
    NoContext(String),

    /// The `$$` namespace is read-only
    #[error("cannot inject into the context namespace via '{0}'")]
    ContextInject(String),
}
