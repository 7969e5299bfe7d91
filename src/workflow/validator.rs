//! Definition Validation
//!
//! Structural validation for workflow definitions:
//! - State field validation
//! - Reference integrity (next/catch targets exist)
//! - Reachability from the root
//! - Cycle detection over next/catch edges
//! - Recursive checks of Map iterators and Parallel branches

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use thiserror::Error;

use super::definition::{State, WorkflowDefinition};

/// Structural errors in a workflow definition.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Definition '{0}' has no states")]
    EmptyDefinition(String),

    #[error("Definition '{0}' has an empty or whitespace-only state id")]
    EmptyStateId(String),

    #[error("Definition '{definition}': root state '{root}' does not exist")]
    UnknownRoot { definition: String, root: String },

    #[error("State '{state}' references unknown state '{reference}'")]
    DanglingReference { state: String, reference: String },

    #[error("Definition '{0}' contains a transition cycle (states reach each other in a loop)")]
    CyclicDependency(String),

    #[error("State '{state}' is unreachable from root of definition '{definition}'")]
    UnreachableState { definition: String, state: String },

    #[error("Task state '{0}' has no operation specified")]
    EmptyOperation(String),

    #[error("Task state '{0}' has a zero-attempt retry policy")]
    ZeroAttempts(String),

    #[error("Map state '{0}' has an empty context key")]
    EmptyContextKey(String),

    #[error("Map state '{0}': iterator must be self-contained (no next, no catch)")]
    IteratorNotSelfContained(String),

    #[error("Parallel state '{0}' declares no branches")]
    NoBranches(String),

    #[error("Fail state '{0}' has no error name")]
    EmptyFailError(String),

    #[error("Branch '{branch}': {source}")]
    Branch {
        branch: String,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Validates the entire definition, including nested branch sub-definitions
/// and Map iterators.
///
/// Guarantees on success:
/// 1. The root state exists
/// 2. Every next/catch reference resolves
/// 3. Every registered state is reachable from the root
/// 4. No transition cycle exists, so repeated stepping terminates
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), ValidationError> {
    info!(
        "Validating definition '{}' with {} states",
        definition.id,
        definition.len()
    );

    if definition.states.is_empty() {
        return Err(ValidationError::EmptyDefinition(definition.id.clone()));
    }

    if !definition.states.contains_key(&definition.root) {
        return Err(ValidationError::UnknownRoot {
            definition: definition.id.clone(),
            root: definition.root.clone(),
        });
    }

    for (id, state) in &definition.states {
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyStateId(definition.id.clone()));
        }

        validate_state(id, state)?;

        for reference in references_of(state) {
            if !definition.states.contains_key(reference) {
                return Err(ValidationError::DanglingReference {
                    state: id.clone(),
                    reference: reference.to_string(),
                });
            }
        }
    }

    check_graph(definition)?;

    debug!("Definition '{}' validated", definition.id);
    Ok(())
}

/// Validates one state's own fields, recursing into composed sub-machines.
fn validate_state(id: &str, state: &State) -> Result<(), ValidationError> {
    match state {
        State::Task(task) => {
            if task.operation.trim().is_empty() {
                return Err(ValidationError::EmptyOperation(id.to_string()));
            }
            if task.retry.max_attempts == 0 {
                return Err(ValidationError::ZeroAttempts(id.to_string()));
            }
        }
        State::Map(map) => {
            if map.context_key.trim().is_empty() {
                return Err(ValidationError::EmptyContextKey(id.to_string()));
            }
            // The iterator runs as an isolated single-state machine; a next
            // or catch target has nothing to resolve against.
            let has_catch = matches!(map.iterator.as_ref(), State::Task(t) if t.catch.is_some());
            if map.iterator.next().is_some() || has_catch {
                return Err(ValidationError::IteratorNotSelfContained(id.to_string()));
            }
            validate_state(&format!("{}.iterator", id), &map.iterator)?;
        }
        State::Parallel(parallel) => {
            if parallel.branches.is_empty() {
                return Err(ValidationError::NoBranches(id.to_string()));
            }
            for branch in &parallel.branches {
                validate_definition(branch).map_err(|source| ValidationError::Branch {
                    branch: branch.id.clone(),
                    source: Box::new(source),
                })?;
            }
        }
        State::Succeed(_) => {}
        State::Fail(fail) => {
            if fail.error.trim().is_empty() {
                return Err(ValidationError::EmptyFailError(id.to_string()));
            }
        }
    }
    Ok(())
}

/// Outgoing transition references of a state (next plus catch target).
fn references_of(state: &State) -> Vec<&str> {
    let mut refs: Vec<&str> = state.next().into_iter().collect();
    if let State::Task(task) = state {
        if let Some(catch) = &task.catch {
            refs.push(catch.next.as_str());
        }
    }
    refs
}

/// Depth-first search over next/catch edges: detects cycles and collects the
/// reachable set, then flags any state the root cannot reach.
fn check_graph(definition: &WorkflowDefinition) -> Result<(), ValidationError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<(&str, usize)> = vec![(definition.root.as_str(), 0)];
    marks.insert(definition.root.as_str(), Mark::InProgress);

    while let Some((id, edge)) = stack.pop() {
        let state = definition
            .states
            .get(id)
            .expect("references validated before traversal");
        let refs = references_of(state);

        if edge >= refs.len() {
            marks.insert(id, Mark::Done);
            continue;
        }

        stack.push((id, edge + 1));
        let target = refs[edge];
        match marks.get(target) {
            Some(Mark::InProgress) => {
                return Err(ValidationError::CyclicDependency(definition.id.clone()))
            }
            Some(Mark::Done) => {}
            None => {
                marks.insert(target, Mark::InProgress);
                stack.push((target, 0));
            }
        }
    }

    let reachable: HashSet<&str> = marks.keys().copied().collect();
    for id in definition.states.keys() {
        if !reachable.contains(id.as_str()) {
            return Err(ValidationError::UnreachableState {
                definition: definition.id.clone(),
                state: id.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DataPath;
    use crate::workflow::definition::{
        Catch, FailState, MapState, ParallelState, SucceedState, TaskState,
    };

    fn path(expr: &str) -> DataPath {
        DataPath::parse(expr).unwrap()
    }

    fn linear_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("wf", "A")
            .with_state("A", State::Task(TaskState::new("op-a").with_next("B")))
            .with_state("B", State::Task(TaskState::new("op-b").with_next("Done")))
            .with_state("Done", State::Succeed(SucceedState::default()))
    }

    #[test]
    fn test_valid_definition() {
        assert!(validate_definition(&linear_definition()).is_ok());
    }

    #[test]
    fn test_empty_definition() {
        let definition = WorkflowDefinition::new("wf", "A");
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::EmptyDefinition(_))
        ));
    }

    #[test]
    fn test_unknown_root() {
        let definition = WorkflowDefinition::new("wf", "Missing")
            .with_state("A", State::Succeed(SucceedState::default()));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::UnknownRoot { .. })
        ));
    }

    #[test]
    fn test_dangling_next() {
        let definition = WorkflowDefinition::new("wf", "A")
            .with_state("A", State::Task(TaskState::new("op").with_next("Ghost")));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_dangling_catch_target() {
        let definition = WorkflowDefinition::new("wf", "A").with_state(
            "A",
            State::Task(TaskState::new("op").with_catch(Catch::to("Ghost"))),
        );
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let definition = WorkflowDefinition::new("wf", "A")
            .with_state("A", State::Task(TaskState::new("op").with_next("B")))
            .with_state("B", State::Task(TaskState::new("op").with_next("A")));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_unreachable_state() {
        let definition = WorkflowDefinition::new("wf", "A")
            .with_state("A", State::Succeed(SucceedState::default()))
            .with_state("Orphan", State::Succeed(SucceedState::default()));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::UnreachableState { .. })
        ));
    }

    #[test]
    fn test_catch_target_counts_as_reachable() {
        let definition = WorkflowDefinition::new("wf", "A")
            .with_state(
                "A",
                State::Task(
                    TaskState::new("op")
                        .with_next("Done")
                        .with_catch(Catch::to("Recover")),
                ),
            )
            .with_state(
                "Recover",
                State::Task(TaskState::new("cleanup").with_next("Done")),
            )
            .with_state("Done", State::Succeed(SucceedState::default()));
        assert!(validate_definition(&definition).is_ok());
    }

    #[test]
    fn test_empty_operation() {
        let definition =
            WorkflowDefinition::new("wf", "A").with_state("A", State::Task(TaskState::new("  ")));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::EmptyOperation(_))
        ));
    }

    #[test]
    fn test_iterator_with_next_rejected() {
        let iterator = State::Task(TaskState::new("op").with_next("Elsewhere"));
        let definition = WorkflowDefinition::new("wf", "M")
            .with_state("M", State::Map(MapState::new(path("$.items"), iterator)));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::IteratorNotSelfContained(_))
        ));
    }

    #[test]
    fn test_parallel_without_branches_rejected() {
        let definition = WorkflowDefinition::new("wf", "P")
            .with_state("P", State::Parallel(ParallelState::new(Vec::new())));
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::NoBranches(_))
        ));
    }

    #[test]
    fn test_invalid_branch_surfaces_with_branch_name() {
        let bad_branch = WorkflowDefinition::new("bad", "Missing");
        let definition = WorkflowDefinition::new("wf", "P")
            .with_state("P", State::Parallel(ParallelState::new(vec![bad_branch])));

        let err = validate_definition(&definition).unwrap_err();
        assert!(matches!(err, ValidationError::Branch { ref branch, .. } if branch == "bad"));
    }

    #[test]
    fn test_fail_state_requires_error_name() {
        let definition = WorkflowDefinition::new("wf", "F").with_state(
            "F",
            State::Fail(FailState {
                error: String::new(),
                cause: "because".to_string(),
            }),
        );
        assert!(matches!(
            validate_definition(&definition),
            Err(ValidationError::EmptyFailError(_))
        ));
    }

    #[test]
    fn test_nested_map_in_parallel_validates() {
        let branch = WorkflowDefinition::new("update", "M").with_state(
            "M",
            State::Map(MapState::new(
                path("$.order"),
                State::Task(TaskState::new("update-stock")),
            )),
        );
        let definition = WorkflowDefinition::new("wf", "P")
            .with_state(
                "P",
                State::Parallel(ParallelState::new(vec![branch]).with_next("Done")),
            )
            .with_state("Done", State::Succeed(SucceedState::default()));
        assert!(validate_definition(&definition).is_ok());
    }
}
