//! Execution History
//!
//! Ordered record of state entry/exit and outcomes for one execution,
//! exportable as JSON for observability. Composers append per-iteration and
//! per-branch records with indexed ids (for example `CheckStock[1]`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one state visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateOutcome {
    /// The state completed and the execution moved on
    Succeeded,
    /// The state failed
    Failed,
    /// The state failed but a catch rule routed execution onward
    Caught,
}

/// A single entry in the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Id of the visited state (indexed for Map iterations, prefixed for
    /// Parallel branches)
    pub state_id: String,
    /// When the state was entered
    pub entered_at: DateTime<Utc>,
    /// When the state was exited
    pub exited_at: DateTime<Utc>,
    /// How the visit ended
    pub outcome: StateOutcome,
}

/// Ordered history of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionHistory {
    records: Vec<HistoryRecord>,
}

impl ExecutionHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state visit that is exiting now.
    pub fn record(
        &mut self,
        state_id: impl Into<String>,
        entered_at: DateTime<Utc>,
        outcome: StateOutcome,
    ) {
        self.records.push(HistoryRecord {
            state_id: state_id.into(),
            entered_at,
            exited_at: Utc::now(),
            outcome,
        });
    }

    /// Appends records produced by a child unit (iteration or branch).
    pub fn extend(&mut self, records: Vec<HistoryRecord>) {
        self.records.extend(records);
    }

    /// Returns all records in order.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Consumes the history, yielding its records.
    pub fn into_records(self) -> Vec<HistoryRecord> {
        self.records
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes the history for export.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}
