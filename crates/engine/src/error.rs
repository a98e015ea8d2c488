// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by the executor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("workflow not registered: {0}")]
    WorkflowNotFound(String),

    /// Replay produced commands that do not line up with recorded history.
    /// Fatal for the instance until the workflow code is fixed; re-running
    /// the turn will hit the same mismatch.
    #[error(
        "non-deterministic workflow execution: history event {event} \
         (schedule event id {schedule_event_id}) has no matching command, found {found}"
    )]
    NonDeterminism {
        event: &'static str,
        schedule_event_id: u64,
        found: String,
    },

    #[error("workflow execution started more than once")]
    DuplicateStart,
}
