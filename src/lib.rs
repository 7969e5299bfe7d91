//! FlowRunner - Workflow Orchestration Engine
//!
//! An in-process interpreter for declarative workflows: a definition is a
//! small graph of states that transform a single JSON document, fan work
//! out over lists, run branches in parallel, and call external operations
//! through a pluggable invoker boundary with retry and timeout handling.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`document`]: Data paths and the resolver over the JSON document
//! - [`workflow`]: Data structures, parsing, and validation for definitions
//! - [`execution`]: Core engine with Map fan-out and Parallel fan-in
//! - [`invoker`]: The task invoker boundary and the in-memory store
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowrunner::execution::Engine;
//! use flowrunner::invoker::InMemoryStore;
//! use flowrunner::fulfillment::order_workflow;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     store.seed("apple", 10).await;
//!
//!     let engine = Engine::new(store);
//!     let input = serde_json::json!({ "order": [{ "sku": "apple", "qty": 3 }] });
//!
//!     let result = engine.execute(order_workflow(), input).await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod execution;
pub mod fulfillment;
pub mod invoker;
pub mod workflow;

// Re-export commonly used types
pub use document::DataPath;
pub use execution::engine::{Engine, ExecutionResult, ExecutionStatus};
pub use invoker::TaskInvoker;
pub use workflow::definition::{State, WorkflowDefinition};
pub use workflow::parser::load_definition;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "FlowRunner");
    }

    #[test]
    fn test_module_exports_definition() {
        let definition = WorkflowDefinition::new("demo", "Start");
        assert!(definition.is_empty());
        assert_eq!(definition.root, "Start");
    }

    #[test]
    fn test_module_exports_path() {
        let path: DataPath = "$.order[0]".parse().unwrap();
        assert_eq!(path.to_string(), "$.order[0]");
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
