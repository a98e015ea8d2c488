// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task types handed from the backend to workers.

use crate::event::Event;
use crate::instance::{InstanceState, Metadata, WorkflowInstance};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

crate::define_id! {
    /// Lease handle for a dequeued workflow task. Exists only while leased.
    pub struct TaskId("tsk-");
}

/// One leased unit of workflow work: the instance's full history plus the
/// pending events snapshotted at dequeue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: TaskId,
    pub instance: WorkflowInstance,
    pub state: InstanceState,
    pub metadata: Metadata,
    /// Highest history sequence id applied before this task.
    pub last_sequence_id: u64,
    pub history: Vec<Event>,
    pub new_events: Vec<Event>,
    /// Arrival sequence of the last pending event included in `new_events`;
    /// the backend trims the pending stream up to here on completion.
    pub custom_data: u64,
}

/// One leased activity invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTask {
    /// Id of the `ActivityScheduled` event that produced this task.
    pub id: Uuid,
    pub instance: WorkflowInstance,
    /// The `ActivityScheduled` event carrying name and inputs.
    pub event: Event,
    /// 1-based delivery attempt; bumped when a lease expires and the task
    /// is handed to another worker.
    pub attempt: u32,
}

/// Context passed to activity functions.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub instance: WorkflowInstance,
    pub attempt: u32,
}
