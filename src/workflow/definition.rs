//! Workflow Definition Model
//!
//! Core data structures representing a workflow as an immutable, serializable
//! graph of states. A definition deserializes from YAML or JSON.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: order-fulfillment
//! root: CheckStock
//! states:
//!   CheckStock:
//!     type: Map
//!     items_path: $.order
//!     context_key: item
//!     iterator:
//!       type: Task
//!       operation: check-stock
//!     next: CreateOrder
//!   CreateOrder:
//!     type: Task
//!     operation: create-order
//!     result_path: $.receipt
//!     next: Done
//!   Done:
//!     type: Succeed
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::DataPath;

/// Retry policy for transient task failures.
///
/// Delays grow exponentially (doubling per attempt) from `base_delay_ms`,
/// capped at `max_delay_ms`. Only transient invoker failures are retried;
/// business rejections and path errors are always fatal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay in milliseconds.
    pub fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    /// Returns the backoff delay after a given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Recovery rule applied when a Task's failure (after retries) should route
/// to a handler state instead of failing the execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Catch {
    /// State to transition to on a caught failure
    pub next: String,

    /// Where the error record is injected into the document
    #[serde(default = "default_error_path")]
    pub error_path: DataPath,
}

fn default_error_path() -> DataPath {
    DataPath::from_key("error")
}

impl Catch {
    /// Creates a catch rule routing to the given state.
    pub fn to(next: impl Into<String>) -> Self {
        Self {
            next: next.into(),
            error_path: default_error_path(),
        }
    }
}

/// Failure policy for Map iterations.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MapFailurePolicy {
    /// The first iteration failure fails the Map (default)
    #[default]
    FailFast,
    /// Up to `limit` failed iterations are tolerated; their slots in the
    /// aggregate result are null
    Tolerate { limit: usize },
}

/// A Task state: one call to a named external operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskState {
    /// Name of the operation the Task Invoker dispatches to
    pub operation: String,

    /// Selects the operation input from the document (whole document if absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<DataPath>,

    /// Where the operation output lands (absent = discard, document unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<DataPath>,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-call deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Recovery rule for otherwise-fatal failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch: Option<Catch>,

    /// Next state id (absent = this state ends its machine successfully)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl TaskState {
    /// Creates a task calling the given operation, with default policy and
    /// no transition.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into().trim().to_string(),
            input_path: None,
            result_path: None,
            retry: RetryPolicy::default(),
            timeout_ms: None,
            catch: None,
            next: None,
        }
    }

    /// Sets the input selection path.
    pub fn with_input_path(mut self, path: DataPath) -> Self {
        self.input_path = Some(path);
        self
    }

    /// Sets the result injection path.
    pub fn with_result_path(mut self, path: DataPath) -> Self {
        self.result_path = Some(path);
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the catch rule.
    pub fn with_catch(mut self, catch: Catch) -> Self {
        self.catch = Some(catch);
        self
    }

    /// Sets the next state.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// A Map state: fan-out of one inner state over each element of a list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MapState {
    /// Path resolving to the list being iterated
    pub items_path: DataPath,

    /// Document key the current item is injected at in each iteration copy
    #[serde(default = "default_context_key")]
    pub context_key: String,

    /// The state executed once per item
    pub iterator: Box<State>,

    /// Where the ordered list of iteration outputs lands (absent = discard)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<DataPath>,

    /// Failure policy (fail-fast unless configured otherwise)
    #[serde(default)]
    pub failure_policy: MapFailurePolicy,

    /// Concurrency cap for iterations (absent = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Next state id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

fn default_context_key() -> String {
    "item".to_string()
}

impl MapState {
    /// Creates a Map over the given items path with the given iterator.
    pub fn new(items_path: DataPath, iterator: State) -> Self {
        Self {
            items_path,
            context_key: default_context_key(),
            iterator: Box::new(iterator),
            result_path: None,
            failure_policy: MapFailurePolicy::FailFast,
            max_concurrency: None,
            next: None,
        }
    }

    /// Sets the context-injection key.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    /// Sets the result aggregation path.
    pub fn with_result_path(mut self, path: DataPath) -> Self {
        self.result_path = Some(path);
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: MapFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Caps the number of concurrently running iterations.
    pub fn with_max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = Some(cap.max(1));
        self
    }

    /// Sets the next state.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// A Parallel state: concurrent branch sub-workflows from a shared input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParallelState {
    /// Branch sub-definitions, in declaration order
    pub branches: Vec<WorkflowDefinition>,

    /// Where the ordered list of branch outputs lands (absent = discard)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<DataPath>,

    /// Next state id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl ParallelState {
    /// Creates a Parallel from its branch sub-definitions.
    pub fn new(branches: Vec<WorkflowDefinition>) -> Self {
        Self {
            branches,
            result_path: None,
            next: None,
        }
    }

    /// Sets the result aggregation path.
    pub fn with_result_path(mut self, path: DataPath) -> Self {
        self.result_path = Some(path);
        self
    }

    /// Sets the next state.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// A Succeed state: terminal success, optionally projecting the output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SucceedState {
    /// Projects the final output from the document (whole document if absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<DataPath>,
}

impl SucceedState {
    /// Sets the output projection path.
    pub fn with_output_path(mut self, path: DataPath) -> Self {
        self.output_path = Some(path);
        self
    }
}

/// A Fail state: terminal failure declared by the workflow itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailState {
    /// Short error name
    pub error: String,

    /// Human-readable cause
    #[serde(default)]
    pub cause: String,
}

/// One node of a workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum State {
    Task(TaskState),
    Map(MapState),
    Parallel(ParallelState),
    Succeed(SucceedState),
    Fail(FailState),
}

impl State {
    /// Returns the declared next-state id, if any.
    pub fn next(&self) -> Option<&str> {
        match self {
            State::Task(task) => task.next.as_deref(),
            State::Map(map) => map.next.as_deref(),
            State::Parallel(parallel) => parallel.next.as_deref(),
            State::Succeed(_) | State::Fail(_) => None,
        }
    }

    /// Returns true for Succeed/Fail states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed(_) | State::Fail(_))
    }

    /// Short name of the state kind, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            State::Task(_) => "Task",
            State::Map(_) => "Map",
            State::Parallel(_) => "Parallel",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
        }
    }
}

/// An immutable graph of states with a designated root.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Identifier for this definition (also used as branch name in Parallel)
    pub id: String,

    /// Id of the state execution starts at
    pub root: String,

    /// States keyed by id
    pub states: BTreeMap<String, State>,
}

impl WorkflowDefinition {
    /// Creates an empty definition with the given id and root state id.
    pub fn new(id: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            root: root.into().trim().to_string(),
            states: BTreeMap::new(),
        }
    }

    /// Registers a state under an id.
    pub fn add_state(&mut self, id: impl Into<String>, state: State) -> Result<(), String> {
        let id = id.into();
        if self.states.contains_key(&id) {
            return Err(format!("State '{}' already exists", id));
        }
        self.states.insert(id, state);
        Ok(())
    }

    /// Builder-style [`add_state`](Self::add_state) that panics on duplicates.
    /// Intended for statically-known definitions.
    pub fn with_state(mut self, id: impl Into<String>, state: State) -> Self {
        let id = id.into();
        if self.states.insert(id.clone(), state).is_some() {
            panic!("State '{}' already exists", id);
        }
        self
    }

    /// Looks up a state by id.
    pub fn get_state(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    /// Returns the number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no states are registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expr: &str) -> DataPath {
        DataPath::parse(expr).unwrap()
    }

    #[test]
    fn test_task_builder() {
        let task = TaskState::new(" check-stock ")
            .with_input_path(path("$.item"))
            .with_result_path(path("$.stock"))
            .with_timeout_ms(500)
            .with_next("Next");

        assert_eq!(task.operation, "check-stock");
        assert_eq!(task.input_path.unwrap().to_string(), "$.item");
        assert_eq!(task.result_path.unwrap().to_string(), "$.stock");
        assert_eq!(task.timeout_ms, Some(500));
        assert_eq!(task.next.as_deref(), Some("Next"));
    }

    #[test]
    fn test_retry_policy_defaults() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay_ms, 100);
    }

    #[test]
    fn test_retry_policy_backoff_doubles() {
        let retry = RetryPolicy::default().with_base_delay_ms(100);
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_policy_backoff_capped() {
        let retry = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 2_500,
        };
        assert_eq!(retry.delay_after(5), Duration::from_millis(2_500));
    }

    #[test]
    fn test_retry_policy_none() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }

    #[test]
    fn test_state_next_and_terminal() {
        let task = State::Task(TaskState::new("op").with_next("B"));
        assert_eq!(task.next(), Some("B"));
        assert!(!task.is_terminal());

        let succeed = State::Succeed(SucceedState::default());
        assert_eq!(succeed.next(), None);
        assert!(succeed.is_terminal());
    }

    #[test]
    fn test_definition_add_state_duplicate() {
        let mut definition = WorkflowDefinition::new("wf", "A");
        let state = State::Succeed(SucceedState::default());

        assert!(definition.add_state("A", state.clone()).is_ok());
        assert!(definition.add_state("A", state).is_err());
        assert_eq!(definition.len(), 1);
    }

    #[test]
    fn test_definition_serde_yaml_roundtrip() {
        let definition = WorkflowDefinition::new("demo", "DoWork")
            .with_state(
                "DoWork",
                State::Task(TaskState::new("noop").with_next("Done")),
            )
            .with_state("Done", State::Succeed(SucceedState::default()));

        let yaml = serde_yaml::to_string(&definition).unwrap();
        let parsed: WorkflowDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, definition);
    }

    #[test]
    fn test_definition_deserializes_tagged_states() {
        let yaml = r#"
id: demo
root: M
states:
  M:
    type: Map
    items_path: $.order
    iterator:
      type: Task
      operation: check-stock
    failure_policy:
      tolerate:
        limit: 1
    next: Done
  Done:
    type: Succeed
"#;
        let definition: WorkflowDefinition = serde_yaml::from_str(yaml).unwrap();
        let State::Map(map) = definition.get_state("M").unwrap() else {
            panic!("expected Map state");
        };
        assert_eq!(map.items_path.to_string(), "$.order");
        assert_eq!(map.context_key, "item");
        assert_eq!(map.failure_policy, MapFailurePolicy::Tolerate { limit: 1 });
        let State::Task(task) = map.iterator.as_ref() else {
            panic!("expected Task iterator");
        };
        assert_eq!(task.operation, "check-stock");
        assert_eq!(task.retry.max_attempts, 3);
    }

    #[test]
    fn test_map_failure_policy_default() {
        assert_eq!(MapFailurePolicy::default(), MapFailurePolicy::FailFast);
    }

    #[test]
    fn test_catch_default_error_path() {
        let catch = Catch::to("Recover");
        assert_eq!(catch.error_path.to_string(), "$.error");
        assert_eq!(catch.next, "Recover");
    }
}
