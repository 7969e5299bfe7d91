//! Map Composer
//!
//! Fans a single iterator state out over the elements of a list in the
//! document. Iterations run concurrently over isolated document copies,
//! optionally bounded by a concurrency cap, and every dispatched iteration
//! settles before the Map concludes. Failure handling follows the state's
//! policy: fail-fast (the default) or a bounded tolerance that leaves null
//! slots for failed iterations.

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::document::{inject, resolve, DataPath, IterationContext};
use crate::execution::engine::{eval_boxed, Engine};
use crate::execution::history::{ExecutionHistory, HistoryRecord, StateOutcome};
use crate::execution::{ErrorKind, EvalOutcome, FailureCause};
use crate::workflow::{MapFailurePolicy, MapState};

/// Evaluates a Map state against the current document.
pub(crate) async fn run_map(
    engine: &Engine,
    state_id: &str,
    map: &MapState,
    doc: Value,
    ctx: Option<&IterationContext>,
    cancel: &Arc<AtomicBool>,
    history: &mut ExecutionHistory,
) -> Result<EvalOutcome, FailureCause> {
    let entered = Utc::now();

    let items_value = resolve(&doc, ctx, &map.items_path).map_err(|e| {
        history.record(state_id, entered, StateOutcome::Failed);
        FailureCause::from_path(state_id, e)
    })?;

    let items = match items_value {
        Value::Array(items) => items,
        other => {
            history.record(state_id, entered, StateOutcome::Failed);
            return Err(FailureCause::new(
                state_id,
                ErrorKind::TypeMismatch,
                format!(
                    "items path '{}' resolved to {} instead of a list",
                    map.items_path,
                    crate::document::type_name(&other)
                ),
            ));
        }
    };

    // An empty list concludes immediately without touching the iterator.
    if items.is_empty() {
        let doc = apply_aggregate(state_id, doc, map, Vec::new())?;
        history.record(state_id, entered, StateOutcome::Succeeded);
        return Ok(EvalOutcome::Next {
            doc,
            next: map.next.clone(),
        });
    }

    let total = items.len();
    let cap = map.max_concurrency.or(engine.config().max_map_concurrency);
    let semaphore = cap.map(|n| Arc::new(Semaphore::new(n.max(1))));
    debug!(
        "Map '{}' dispatching {} iterations (cap: {:?})",
        state_id, total, cap
    );

    let context_path = DataPath::from_key(&map.context_key);
    let mut join_set: JoinSet<(usize, Vec<HistoryRecord>, Result<Value, FailureCause>)> =
        JoinSet::new();
    let mut cancelled = false;

    for (index, item) in items.into_iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }

        let iteration_doc = inject(doc.clone(), &context_path, item.clone()).map_err(|e| {
            history.record(state_id, entered, StateOutcome::Failed);
            FailureCause::from_path(state_id, e)
        })?;
        let iteration_ctx = IterationContext { item, index };
        let future = eval_boxed(
            engine.clone(),
            format!("{}[{}]", state_id, index),
            (*map.iterator).clone(),
            iteration_doc,
            Some(iteration_ctx),
            cancel.clone(),
        );
        let permit_source = semaphore.clone();

        join_set.spawn(async move {
            let _permit = match permit_source {
                Some(semaphore) => Some(
                    semaphore
                        .acquire_owned()
                        .await
                        .expect("map semaphore never closed"),
                ),
                None => None,
            };
            let (records, result) = future.await;
            let output = match result {
                Ok(EvalOutcome::Next { doc, .. }) => Ok(doc),
                Ok(EvalOutcome::Succeeded { output }) => Ok(output),
                Err(cause) => Err(cause),
            };
            (index, records, output)
        });
    }

    // Every dispatched iteration settles, even after a failure.
    let mut outputs: Vec<Option<Value>> = vec![None; total];
    let mut iteration_records: Vec<(usize, Vec<HistoryRecord>)> = Vec::new();
    let mut failures: usize = 0;
    let mut first_failure: Option<FailureCause> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, records, Ok(output))) => {
                outputs[index] = Some(output);
                iteration_records.push((index, records));
            }
            Ok((index, records, Err(cause))) => {
                warn!("Map '{}' iteration {} failed: {}", state_id, index, cause);
                iteration_records.push((index, records));
                failures += 1;
                first_failure.get_or_insert(cause);
            }
            Err(e) => {
                failures += 1;
                first_failure.get_or_insert(FailureCause::new(
                    state_id,
                    ErrorKind::CompositionFailure,
                    format!("iteration task aborted: {}", e),
                ));
            }
        }
    }

    iteration_records.sort_by_key(|(index, _)| *index);
    for (_, records) in iteration_records {
        history.extend(records);
    }

    let verdict = match (&map.failure_policy, first_failure) {
        (_, None) if cancelled => Err(FailureCause::cancelled(state_id)),
        (_, None) => Ok(()),
        (MapFailurePolicy::FailFast, Some(cause)) => Err(compose_failure(cause)),
        (MapFailurePolicy::Tolerate { limit }, Some(cause)) => {
            if cancelled || failures > *limit {
                Err(compose_failure(cause))
            } else {
                Ok(())
            }
        }
    };

    match verdict {
        Ok(()) => {
            // Tolerated failures leave a null slot at their index.
            let aggregate: Vec<Value> = outputs
                .into_iter()
                .map(|slot| slot.unwrap_or(Value::Null))
                .collect();
            let doc = apply_aggregate(state_id, doc, map, aggregate).map_err(|cause| {
                history.record(state_id, entered, StateOutcome::Failed);
                cause
            })?;
            history.record(state_id, entered, StateOutcome::Succeeded);
            Ok(EvalOutcome::Next {
                doc,
                next: map.next.clone(),
            })
        }
        Err(cause) => {
            history.record(state_id, entered, StateOutcome::Failed);
            Err(cause)
        }
    }
}

/// Wraps an iteration failure, keeping the originating state id.
fn compose_failure(inner: FailureCause) -> FailureCause {
    if inner.kind == ErrorKind::Cancelled {
        return inner;
    }
    FailureCause {
        state_id: inner.state_id,
        kind: ErrorKind::CompositionFailure,
        message: format!("iteration failed ({}): {}", inner.kind, inner.message),
    }
}

/// Places the ordered aggregate at the Map's result path, or discards it.
fn apply_aggregate(
    state_id: &str,
    doc: Value,
    map: &MapState,
    aggregate: Vec<Value>,
) -> Result<Value, FailureCause> {
    match &map.result_path {
        Some(path) => inject(doc, path, Value::Array(aggregate))
            .map_err(|e| FailureCause::from_path(state_id, e)),
        None => Ok(doc),
    }
}
