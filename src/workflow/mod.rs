//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating workflow definitions.
//!
//! # Structure
//!
//! - [`definition`]: Core data structures (WorkflowDefinition, State kinds)
//! - [`parser`]: YAML/JSON loading
//! - [`validator`]: Structural validation and cycle detection

pub mod definition;
pub mod parser;
pub mod validator;

pub use definition::{
    Catch, FailState, MapFailurePolicy, MapState, ParallelState, RetryPolicy, State, SucceedState,
    TaskState, WorkflowDefinition,
};
pub use parser::{load_definition, ParseError};
pub use validator::{validate_definition, ValidationError};
