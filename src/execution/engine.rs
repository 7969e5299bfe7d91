//! Workflow Execution Engine
//!
//! The core engine that drives workflow executions including:
//! - State-by-state evaluation over a single JSON document
//! - Map fan-out and Parallel fan-in composition
//! - Retry with exponential backoff at the task boundary
//! - Cooperative cancellation via a shared flag
//! - Per-execution history of state visits

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::document::{resolve, IterationContext};
use crate::execution::history::{ExecutionHistory, HistoryRecord, StateOutcome};
use crate::execution::{map, parallel, task};
use crate::execution::{ErrorKind, EvalOutcome, FailureCause};
use crate::invoker::TaskInvoker;
use crate::workflow::{validate_definition, State, ValidationError, WorkflowDefinition};

/// Engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Default concurrency cap for Map fan-out; `None` leaves every
    /// iteration eligible to run at once. A Map state's own cap wins.
    pub max_map_concurrency: Option<usize>,
}

/// Terminal or in-flight status of an execution.
///
/// Transitions are monotonic: `Running` moves to exactly one of
/// `Succeeded` or `Failed` and never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Handle for requesting cancellation of one execution.
///
/// Cancellation is cooperative: it is observed at suspension points
/// (before task attempts and before dispatching fan-out units), and
/// already dispatched side effects always run to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One in-flight (or finished) run of a workflow over a document.
#[derive(Debug)]
pub struct Execution {
    id: String,
    definition: Arc<WorkflowDefinition>,
    document: Value,
    current_state: String,
    status: ExecutionStatus,
    output: Option<Value>,
    failure: Option<FailureCause>,
    history: ExecutionHistory,
    cancel: Arc<AtomicBool>,
}

impl Execution {
    /// Unique id of this execution.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Id of the state the execution is at (or stopped at).
    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    /// The working document as of the last completed step.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Final output, present once the execution has succeeded.
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// Failure cause, present once the execution has failed.
    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    /// History of state visits so far.
    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Returns a handle that can cancel this execution from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    fn complete(&mut self, status: ExecutionStatus) {
        debug_assert_eq!(self.status, ExecutionStatus::Running);
        self.status = status;
    }

    fn fail(&mut self, cause: FailureCause) {
        warn!("Execution '{}' failed: {}", self.id, cause);
        self.failure = Some(cause);
        self.complete(ExecutionStatus::Failed);
    }
}

/// Summary of a finished execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub output: Option<Value>,
    pub failure: Option<FailureCause>,
    pub history: Vec<HistoryRecord>,
}

/// Workflow execution engine.
///
/// Holds the task invoker boundary and drives any number of executions.
/// Cloning is cheap; clones share the invoker and configuration.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use flowrunner::execution::Engine;
/// use flowrunner::invoker::InMemoryStore;
/// use flowrunner::load_definition;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let definition = load_definition("fulfillment.yaml")?;
///     let engine = Engine::new(Arc::new(InMemoryStore::new()));
///
///     let result = engine
///         .execute(definition, serde_json::json!({ "order": [] }))
///         .await?;
///     println!("{}", result.status);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    invoker: Arc<dyn TaskInvoker>,
    config: EngineConfig,
    execution_counter: Arc<AtomicU64>,
}

impl Engine {
    /// Creates an engine over the given task invoker with default tuning.
    pub fn new(invoker: Arc<dyn TaskInvoker>) -> Self {
        Self::with_config(invoker, EngineConfig::default())
    }

    /// Creates an engine with explicit tuning.
    pub fn with_config(invoker: Arc<dyn TaskInvoker>, config: EngineConfig) -> Self {
        Self {
            invoker,
            config,
            execution_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The task invoker boundary.
    pub fn invoker(&self) -> &Arc<dyn TaskInvoker> {
        &self.invoker
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a definition and starts a new execution over `input`.
    ///
    /// The execution is returned in `Running` state positioned at the
    /// root; drive it with [`step`](Engine::step) or [`run`](Engine::run).
    pub fn start(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<Execution, ValidationError> {
        validate_definition(&definition)?;

        let serial = self.execution_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{:06}", definition.id, serial);
        info!("Starting execution '{}' at state '{}'", id, definition.root);

        Ok(Execution {
            id,
            current_state: definition.root.clone(),
            definition: Arc::new(definition),
            document: input,
            status: ExecutionStatus::Running,
            output: None,
            failure: None,
            history: ExecutionHistory::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Evaluates the execution's current state and advances it.
    ///
    /// Returns the status after the step. Calling `step` on a finished
    /// execution is a no-op that returns the terminal status.
    pub async fn step(&self, execution: &mut Execution) -> ExecutionStatus {
        if execution.status != ExecutionStatus::Running {
            return execution.status;
        }
        if execution.cancel.load(Ordering::SeqCst) {
            execution.fail(FailureCause::cancelled(&execution.current_state));
            return execution.status;
        }

        let state_id = execution.current_state.clone();
        let state = match execution.definition.get_state(&state_id) {
            Some(state) => state.clone(),
            None => {
                // Unreachable for validated definitions.
                execution.fail(FailureCause::new(
                    &state_id,
                    ErrorKind::CompositionFailure,
                    "transition to an unknown state",
                ));
                return execution.status;
            }
        };

        debug!(
            "Execution '{}' entering state '{}'",
            execution.id, state_id
        );
        // A failed step leaves the document as of the last completed step.
        let doc = execution.document.clone();
        let cancel = execution.cancel.clone();
        let outcome = self
            .eval_state(&state_id, &state, doc, None, &cancel, &mut execution.history)
            .await;

        match outcome {
            Ok(EvalOutcome::Next {
                doc,
                next: Some(next),
            }) => {
                execution.document = doc;
                execution.current_state = next;
            }
            Ok(EvalOutcome::Next { doc, next: None }) => {
                execution.document = doc.clone();
                execution.output = Some(doc);
                execution.complete(ExecutionStatus::Succeeded);
                info!("Execution '{}' succeeded", execution.id);
            }
            Ok(EvalOutcome::Succeeded { output }) => {
                execution.output = Some(output);
                execution.complete(ExecutionStatus::Succeeded);
                info!("Execution '{}' succeeded", execution.id);
            }
            Err(cause) => execution.fail(cause),
        }

        execution.status
    }

    /// Drives an execution until it reaches a terminal status.
    ///
    /// Termination is guaranteed: validation rejects cyclic definitions,
    /// so the number of steps is bounded by the state count.
    pub async fn run(&self, execution: &mut Execution) -> ExecutionStatus {
        while execution.status == ExecutionStatus::Running {
            self.step(execution).await;
        }
        execution.status
    }

    /// Starts and runs a definition over `input` in one call.
    pub async fn execute(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<ExecutionResult, ValidationError> {
        let mut execution = self.start(definition, input)?;
        self.run(&mut execution).await;
        Ok(ExecutionResult {
            execution_id: execution.id,
            status: execution.status,
            output: execution.output,
            failure: execution.failure,
            history: execution.history.into_records(),
        })
    }

    /// Evaluates one state against the document.
    pub(crate) async fn eval_state(
        &self,
        state_id: &str,
        state: &State,
        doc: Value,
        ctx: Option<&IterationContext>,
        cancel: &Arc<AtomicBool>,
        history: &mut ExecutionHistory,
    ) -> Result<EvalOutcome, FailureCause> {
        match state {
            State::Task(task) => {
                task::run_task(self, state_id, task, doc, ctx, cancel, history).await
            }
            State::Map(map) => {
                map::run_map(self, state_id, map, doc, ctx, cancel, history).await
            }
            State::Parallel(parallel) => {
                parallel::run_parallel(self, state_id, parallel, doc, ctx, cancel, history).await
            }
            State::Succeed(succeed) => {
                let entered = Utc::now();
                let output = match &succeed.output_path {
                    Some(path) => resolve(&doc, ctx, path).map_err(|e| {
                        history.record(state_id, entered, StateOutcome::Failed);
                        FailureCause::from_path(state_id, e)
                    })?,
                    None => doc,
                };
                history.record(state_id, entered, StateOutcome::Succeeded);
                Ok(EvalOutcome::Succeeded { output })
            }
            State::Fail(fail) => {
                history.record(state_id, Utc::now(), StateOutcome::Failed);
                Err(FailureCause::new(
                    state_id,
                    ErrorKind::OperationError,
                    format!("{}: {}", fail.error, fail.cause),
                ))
            }
        }
    }
}

/// Future yielded by the boxed recursion helpers.
type BoxedEval =
    Pin<Box<dyn Future<Output = (Vec<HistoryRecord>, Result<EvalOutcome, FailureCause>)> + Send>>;

/// Evaluates one state on an owned engine, collecting its history.
///
/// Composers recurse through this boxed form; a Map iterator or a
/// Parallel branch may itself contain composers of arbitrary depth.
pub(crate) fn eval_boxed(
    engine: Engine,
    state_id: String,
    state: State,
    doc: Value,
    ctx: Option<IterationContext>,
    cancel: Arc<AtomicBool>,
) -> BoxedEval {
    Box::pin(async move {
        let mut history = ExecutionHistory::new();
        let result = engine
            .eval_state(&state_id, &state, doc, ctx.as_ref(), &cancel, &mut history)
            .await;
        (history.into_records(), result)
    })
}

/// Runs a branch sub-workflow from its root to its implicit or explicit
/// end, yielding the branch output document.
pub(crate) fn run_branch_boxed(
    engine: Engine,
    branch: WorkflowDefinition,
    doc: Value,
    ctx: Option<IterationContext>,
    cancel: Arc<AtomicBool>,
) -> Pin<Box<dyn Future<Output = (Vec<HistoryRecord>, Result<Value, FailureCause>)> + Send>> {
    Box::pin(async move {
        let mut records = Vec::new();
        let mut current = branch.root.clone();
        let mut doc = doc;

        loop {
            let state = match branch.get_state(&current) {
                Some(state) => state.clone(),
                None => {
                    return (
                        records,
                        Err(FailureCause::new(
                            &current,
                            ErrorKind::CompositionFailure,
                            "transition to an unknown state",
                        )),
                    );
                }
            };

            let (visit_records, result) = eval_boxed(
                engine.clone(),
                current.clone(),
                state,
                doc,
                ctx.clone(),
                cancel.clone(),
            )
            .await;
            records.extend(visit_records);

            match result {
                Ok(EvalOutcome::Next {
                    doc: next_doc,
                    next: Some(next),
                }) => {
                    doc = next_doc;
                    current = next;
                }
                Ok(EvalOutcome::Next {
                    doc: next_doc,
                    next: None,
                }) => return (records, Ok(next_doc)),
                Ok(EvalOutcome::Succeeded { output }) => return (records, Ok(output)),
                Err(cause) => return (records, Err(cause)),
            }
        }
    })
}
