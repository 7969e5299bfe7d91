//! Parallel Composer
//!
//! Runs every branch sub-workflow concurrently over an isolated copy of the
//! document and waits for all of them. Branch outputs aggregate in
//! declaration order; any branch failure fails the whole state, but only
//! after every branch has settled, so a sibling's side effects are never
//! torn down mid-flight.

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::document::{inject, IterationContext};
use crate::execution::engine::{run_branch_boxed, Engine};
use crate::execution::history::{ExecutionHistory, HistoryRecord, StateOutcome};
use crate::execution::{ErrorKind, EvalOutcome, FailureCause};
use crate::workflow::ParallelState;

/// Evaluates a Parallel state against the current document.
pub(crate) async fn run_parallel(
    engine: &Engine,
    state_id: &str,
    parallel: &ParallelState,
    doc: Value,
    ctx: Option<&IterationContext>,
    cancel: &Arc<AtomicBool>,
    history: &mut ExecutionHistory,
) -> Result<EvalOutcome, FailureCause> {
    let entered = Utc::now();
    let total = parallel.branches.len();
    debug!("Parallel '{}' dispatching {} branches", state_id, total);

    let mut join_set: JoinSet<(usize, String, Vec<HistoryRecord>, Result<Value, FailureCause>)> =
        JoinSet::new();
    let mut cancelled = false;

    for (index, branch) in parallel.branches.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }

        let branch_id = branch.id.clone();
        let future = run_branch_boxed(
            engine.clone(),
            branch.clone(),
            doc.clone(),
            ctx.cloned(),
            cancel.clone(),
        );
        join_set.spawn(async move {
            let (records, result) = future.await;
            (index, branch_id, records, result)
        });
    }

    // All dispatched branches settle before the state concludes.
    let mut outputs: Vec<Option<Value>> = vec![None; total];
    let mut branch_records: Vec<(usize, Vec<HistoryRecord>)> = Vec::new();
    let mut first_failure: Option<FailureCause> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, branch_id, mut records, result)) => {
                for record in &mut records {
                    record.state_id = format!("{}.{}", branch_id, record.state_id);
                }
                match result {
                    Ok(output) => outputs[index] = Some(output),
                    Err(cause) => {
                        warn!(
                            "Parallel '{}' branch '{}' failed: {}",
                            state_id, branch_id, cause
                        );
                        first_failure.get_or_insert(compose_failure(&branch_id, cause));
                    }
                }
                branch_records.push((index, records));
            }
            Err(e) => {
                first_failure.get_or_insert(FailureCause::new(
                    state_id,
                    ErrorKind::CompositionFailure,
                    format!("branch task aborted: {}", e),
                ));
            }
        }
    }

    branch_records.sort_by_key(|(index, _)| *index);
    for (_, records) in branch_records {
        history.extend(records);
    }

    if let Some(cause) = first_failure {
        history.record(state_id, entered, StateOutcome::Failed);
        return Err(cause);
    }
    if cancelled {
        history.record(state_id, entered, StateOutcome::Failed);
        return Err(FailureCause::cancelled(state_id));
    }

    let aggregate: Vec<Value> = outputs
        .into_iter()
        .map(|slot| slot.unwrap_or(Value::Null))
        .collect();
    let doc = match &parallel.result_path {
        Some(path) => inject(doc, path, Value::Array(aggregate)).map_err(|e| {
            history.record(state_id, entered, StateOutcome::Failed);
            FailureCause::from_path(state_id, e)
        })?,
        None => doc,
    };

    history.record(state_id, entered, StateOutcome::Succeeded);
    Ok(EvalOutcome::Next {
        doc,
        next: parallel.next.clone(),
    })
}

/// Wraps a branch failure, keeping the originating state id.
fn compose_failure(branch_id: &str, inner: FailureCause) -> FailureCause {
    if inner.kind == ErrorKind::Cancelled {
        return inner;
    }
    FailureCause {
        state_id: format!("{}.{}", branch_id, inner.state_id),
        kind: ErrorKind::CompositionFailure,
        message: format!(
            "branch '{}' failed ({}): {}",
            branch_id, inner.kind, inner.message
        ),
    }
}
