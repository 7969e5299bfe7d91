//! Task State Evaluation
//!
//! Runs one Task state: resolves the input projection, invokes the
//! operation through the [`TaskInvoker`](crate::invoker::TaskInvoker)
//! boundary with an optional deadline, retries transient failures with
//! exponential backoff, and routes caught failures to a recovery state.

use chrono::Utc;
use log::{debug, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{sleep, timeout, Duration};

use crate::document::{inject, resolve, IterationContext};
use crate::execution::engine::Engine;
use crate::execution::history::{ExecutionHistory, StateOutcome};
use crate::execution::{EvalOutcome, FailureCause};
use crate::invoker::InvokeError;
use crate::workflow::TaskState;

/// Evaluates a Task state against the current document.
pub(crate) async fn run_task(
    engine: &Engine,
    state_id: &str,
    task: &TaskState,
    doc: Value,
    ctx: Option<&IterationContext>,
    cancel: &AtomicBool,
    history: &mut ExecutionHistory,
) -> Result<EvalOutcome, FailureCause> {
    let entered = Utc::now();

    let input = match &task.input_path {
        Some(path) => resolve(&doc, ctx, path).map_err(|e| {
            history.record(state_id, entered, StateOutcome::Failed);
            FailureCause::from_path(state_id, e)
        })?,
        None => doc.clone(),
    };

    debug!("Task '{}' invoking operation '{}'", state_id, task.operation);

    let mut attempt: u32 = 1;
    let error = loop {
        if cancel.load(Ordering::SeqCst) {
            history.record(state_id, entered, StateOutcome::Failed);
            return Err(FailureCause::cancelled(state_id));
        }

        let call = engine.invoker().invoke(&task.operation, input.clone());
        let result = match task.timeout_ms {
            Some(ms) => {
                let deadline = Duration::from_millis(ms);
                match timeout(deadline, call).await {
                    Ok(r) => r,
                    Err(_) => Err(InvokeError::Timeout(deadline)),
                }
            }
            None => call.await,
        };

        match result {
            Ok(output) => {
                let doc = apply_result(state_id, doc, task, output).map_err(|cause| {
                    history.record(state_id, entered, StateOutcome::Failed);
                    cause
                })?;
                history.record(state_id, entered, StateOutcome::Succeeded);
                return Ok(EvalOutcome::Next {
                    doc,
                    next: task.next.clone(),
                });
            }
            Err(err) if err.is_transient() && attempt < task.retry.max_attempts => {
                let delay = task.retry.delay_after(attempt);
                warn!(
                    "Task '{}' attempt {}/{} failed: {} - retrying in {:?}",
                    state_id, attempt, task.retry.max_attempts, err, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => break err,
        }
    };

    if let Some(catch) = &task.catch {
        let cause = FailureCause::from_invoke(state_id, &error);
        warn!(
            "Task '{}' failed ({}), routing to '{}'",
            state_id, error, catch.next
        );
        let error_record = json!({
            "error": cause.kind.to_string(),
            "cause": cause.message,
        });
        let doc = inject(doc, &catch.error_path, error_record).map_err(|e| {
            history.record(state_id, entered, StateOutcome::Failed);
            FailureCause::from_path(state_id, e)
        })?;
        history.record(state_id, entered, StateOutcome::Caught);
        return Ok(EvalOutcome::Next {
            doc,
            next: Some(catch.next.clone()),
        });
    }

    history.record(state_id, entered, StateOutcome::Failed);
    Err(FailureCause::from_invoke(state_id, &error))
}

/// Places the operation output at the task's result path, or discards it
/// when no result path is set.
fn apply_result(
    state_id: &str,
    doc: Value,
    task: &TaskState,
    output: Value,
) -> Result<Value, FailureCause> {
    match &task.result_path {
        Some(path) => {
            inject(doc, path, output).map_err(|e| FailureCause::from_path(state_id, e))
        }
        None => Ok(doc),
    }
}
