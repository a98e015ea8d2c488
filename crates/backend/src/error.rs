// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend error classes.

use lh_core::InstanceId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("workflow instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("workflow instance already exists: {0}")]
    InstanceAlreadyExists(InstanceId),

    /// The lease was stolen or expired; none of the turn's effects were
    /// applied.
    #[error("workflow task lease lost for instance {0}")]
    LeaseLost(InstanceId),

    #[error("activity task not found: {0}")]
    ActivityNotFound(Uuid),

    /// Executed events do not continue the instance's dense sequence.
    #[error("history sequence mismatch for {instance_id}: expected {expected}, got {got}")]
    SequenceMismatch {
        instance_id: InstanceId,
        expected: u64,
        got: u64,
    },
}
