// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lh-backend: The persistence contract workers and clients run against.
//!
//! Implementations own all shared mutable state. Each operation below is
//! one atomic unit; no other isolation or cross-operation consistency is
//! promised or required.

pub mod error;
pub mod memory;
mod options;

pub use error::BackendError;
pub use memory::MemoryBackend;
pub use options::BackendOptions;

use async_trait::async_trait;
use lh_core::{
    ActivityTask, Event, InstanceId, InstanceState, Metadata, TaskId, WorkerId, WorkflowEvent,
    WorkflowInstance, WorkflowTask,
};
use uuid::Uuid;

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Create an instance, seed its pending stream with the started event,
    /// and enqueue it. Re-creating the same `(instance_id, execution_id)`
    /// is an idempotent no-op; a different execution id is a conflict.
    async fn create_workflow_instance(
        &self,
        instance: WorkflowInstance,
        metadata: Metadata,
        started_event: Event,
    ) -> Result<(), BackendError>;

    /// Materialize due future events, then dequeue one instance under a
    /// fresh lease. Blocks up to `block_timeout`; `None` on timeout.
    async fn get_workflow_task(
        &self,
        worker: &WorkerId,
    ) -> Result<Option<WorkflowTask>, BackendError>;

    /// Push the lease expiry forward by `workflow_lock_timeout`.
    async fn extend_workflow_task(&self, task_id: &TaskId) -> Result<(), BackendError>;

    /// Atomically checkpoint a turn: append executed events to history,
    /// deliver cross-instance events (creating targets for started
    /// events), register future events, enqueue activity tasks, update
    /// instance state, trim the consumed pending prefix, release the
    /// lease, and requeue the instance if pending events remain.
    async fn complete_workflow_task(
        &self,
        task: &WorkflowTask,
        state: InstanceState,
        executed_events: Vec<Event>,
        activity_events: Vec<Event>,
        timer_events: Vec<Event>,
        workflow_events: Vec<WorkflowEvent>,
    ) -> Result<(), BackendError>;

    /// Append an externally delivered event (signal, cancellation) to an
    /// instance's pending stream and enqueue it.
    async fn signal_workflow_instance(
        &self,
        instance_id: &InstanceId,
        event: Event,
    ) -> Result<(), BackendError>;

    async fn cancel_workflow_instance(
        &self,
        instance_id: &InstanceId,
        event: Event,
    ) -> Result<(), BackendError>;

    /// Dequeue one activity task under a lease. Expired leases are
    /// redelivered with a bumped attempt counter. Blocks up to
    /// `block_timeout`; `None` on timeout.
    async fn get_activity_task(&self) -> Result<Option<ActivityTask>, BackendError>;

    async fn extend_activity_task(&self, activity_id: &Uuid) -> Result<(), BackendError>;

    /// Remove the activity task and append its result event to the
    /// originating instance's pending stream.
    async fn complete_activity_task(
        &self,
        instance: &WorkflowInstance,
        activity_id: &Uuid,
        result_event: Event,
    ) -> Result<(), BackendError>;

    /// Snapshot read of history events with `sequence_id > from_sequence_id`.
    async fn get_workflow_instance_history(
        &self,
        instance_id: &InstanceId,
        from_sequence_id: u64,
    ) -> Result<Vec<Event>, BackendError>;

    /// Snapshot read of the instance lifecycle state.
    async fn get_workflow_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<InstanceState, BackendError>;

    fn options(&self) -> &BackendOptions;
}
