// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference backend over in-memory tables.
//!
//! One mutex guards the whole store, so every contract operation is a
//! single critical section and the atomicity guarantees hold by
//! construction. Leases and timer visibility run off the injected clock;
//! tests steer it without sleeping.

mod tables;

use crate::error::BackendError;
use crate::options::BackendOptions;
use crate::Backend;
use async_trait::async_trait;
use lh_core::{
    ActivityTask, Clock, Event, EventKind, InstanceId, InstanceState, Metadata, SystemClock,
    TaskId, WorkerId, WorkflowError, WorkflowEvent, WorkflowInstance, WorkflowTask,
};
use parking_lot::Mutex;
use tables::{ActivityRow, FutureEventRow, InstanceRow, Store};
use tokio::sync::Notify;
use uuid::Uuid;

pub struct MemoryBackend<C: Clock = SystemClock> {
    options: BackendOptions,
    clock: C,
    store: Mutex<Store>,
    workflow_wake: Notify,
    activity_wake: Notify,
}

impl MemoryBackend<SystemClock> {
    pub fn new(options: BackendOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl<C: Clock> MemoryBackend<C> {
    pub fn with_clock(options: BackendOptions, clock: C) -> Self {
        Self {
            options,
            clock,
            store: Mutex::new(Store::default()),
            workflow_wake: Notify::new(),
            activity_wake: Notify::new(),
        }
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }
}

#[async_trait]
impl<C: Clock> Backend for MemoryBackend<C> {
    async fn create_workflow_instance(
        &self,
        instance: WorkflowInstance,
        metadata: Metadata,
        started_event: Event,
    ) -> Result<(), BackendError> {
        {
            let mut store = self.store.lock();
            let now = self.now();
            if let Some(existing) = store.instances.get(&instance.instance_id) {
                if existing.instance.execution_id == instance.execution_id {
                    return Ok(());
                }
                return Err(BackendError::InstanceAlreadyExists(instance.instance_id));
            }
            let instance_id = instance.instance_id;
            let mut row = InstanceRow::new(instance, metadata, now);
            row.push_pending(started_event);
            store.instances.insert(instance_id, row);
            store.enqueue(instance_id);
        }
        self.workflow_wake.notify_waiters();
        Ok(())
    }

    async fn get_workflow_task(
        &self,
        worker: &WorkerId,
    ) -> Result<Option<WorkflowTask>, BackendError> {
        let deadline = tokio::time::Instant::now() + self.options.block_timeout;
        loop {
            let notified = self.workflow_wake.notified();
            {
                let mut store = self.store.lock();
                let now = self.now();
                store.materialize_due_future_events(now);
                store.reap_expired_leases(now);
                if let Some(task) = store.dequeue(worker, now, &self.options) {
                    return Ok(Some(task));
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn extend_workflow_task(&self, task_id: &TaskId) -> Result<(), BackendError> {
        let mut store = self.store.lock();
        let now = self.now();
        let lease_extension = self.options.workflow_lock_timeout.as_millis() as u64;
        for (instance_id, lease) in store.leases.iter_mut() {
            if lease.task_id == *task_id {
                if lease.leased_until <= now {
                    return Err(BackendError::LeaseLost(*instance_id));
                }
                lease.leased_until = now + lease_extension;
                return Ok(());
            }
        }
        // The lease was reaped or completed under another worker.
        Err(BackendError::LeaseLost(InstanceId::from_string("")))
    }

    async fn complete_workflow_task(
        &self,
        task: &WorkflowTask,
        state: InstanceState,
        executed_events: Vec<Event>,
        activity_events: Vec<Event>,
        timer_events: Vec<Event>,
        workflow_events: Vec<WorkflowEvent>,
    ) -> Result<(), BackendError> {
        let instance_id = task.instance.instance_id;
        {
            let mut store = self.store.lock();
            let now = self.now();

            // Verify the lease before touching anything; a lost lease
            // means none of this turn's effects may become durable.
            let lease_worker = match store.leases.get(&instance_id) {
                Some(lease) if lease.task_id == task.id && lease.leased_until > now => {
                    lease.worker
                }
                _ => return Err(BackendError::LeaseLost(instance_id)),
            };

            // Validate the dense sequence before appending.
            {
                let row = store
                    .instances
                    .get(&instance_id)
                    .ok_or(BackendError::InstanceNotFound(instance_id))?;
                let mut expected = row.last_sequence_id;
                for event in &executed_events {
                    expected += 1;
                    if event.sequence_id != expected {
                        return Err(BackendError::SequenceMismatch {
                            instance_id,
                            expected,
                            got: event.sequence_id,
                        });
                    }
                }
            }

            if let Some(row) = store.instances.get_mut(&instance_id) {
                row.history.extend(executed_events.iter().cloned());
            }

            // Executed-event side effects: canceled timers drop their
            // future entries; workflow-initiated signals are delivered
            // here, inside the checkpoint, with the outcome reported back
            // to the sender's own pending stream.
            for event in &executed_events {
                match &event.kind {
                    EventKind::TimerCanceled {} => {
                        store.future_events.retain(|row| {
                            !(row.instance_id == instance_id
                                && row.schedule_event_id == event.schedule_event_id)
                        });
                    }
                    EventKind::SignalWorkflowScheduled { instance_id: target, name, arg } => {
                        let target = *target;
                        let delivery_error = if store.instances.contains_key(&target) {
                            let signal = Event::new(
                                now,
                                EventKind::SignalReceived { name: name.clone(), arg: arg.clone() },
                            );
                            store.push_pending_to(&target, signal);
                            store.enqueue(target);
                            None
                        } else {
                            Some(WorkflowError::instance_not_found(target.as_str()))
                        };
                        let outcome = Event::with_schedule_id(
                            now,
                            event.schedule_event_id,
                            EventKind::SignalWorkflowDelivered { error: delivery_error },
                        );
                        store.push_pending_to(&instance_id, outcome);
                    }
                    _ => {}
                }
            }

            for event in timer_events {
                let Some(visible_at) = event.visible_at else {
                    tracing::warn!(
                        instance_id = %instance_id,
                        event = event.type_name(),
                        "dropping future event without visibility"
                    );
                    continue;
                };
                store.future_events.push(FutureEventRow {
                    visible_at,
                    instance_id,
                    schedule_event_id: event.schedule_event_id,
                    event,
                });
            }

            for workflow_event in workflow_events {
                let target = workflow_event.instance.instance_id;
                if let EventKind::WorkflowExecutionStarted { .. } = &workflow_event.event.kind {
                    if store.instances.contains_key(&target) {
                        tracing::warn!(
                            instance_id = %target,
                            "sub-workflow target already exists; skipping bootstrap"
                        );
                        continue;
                    }
                    store.instances.insert(
                        target,
                        InstanceRow::new(workflow_event.instance.clone(), Metadata::default(), now),
                    );
                } else if !store.instances.contains_key(&target) {
                    tracing::warn!(
                        instance_id = %target,
                        event = workflow_event.event.type_name(),
                        "dropping cross-instance event for unknown instance"
                    );
                    continue;
                }
                store.push_pending_to(&target, workflow_event.event);
                store.enqueue(target);
            }

            for event in activity_events {
                store.activities.push(ActivityRow {
                    id: event.id,
                    instance: task.instance.clone(),
                    event,
                    attempt: 1,
                    leased_until: None,
                });
            }

            let mut requeue = false;
            if let Some(row) = store.instances.get_mut(&instance_id) {
                row.state = state;
                if state == InstanceState::Finished && row.completed_at.is_none() {
                    row.completed_at = Some(now);
                }
                if let Some(last) = row.history.last() {
                    row.last_sequence_id = last.sequence_id;
                }
                row.pending.retain(|(arrival_seq, _)| *arrival_seq > task.custom_data);
                row.sticky =
                    Some((lease_worker, now + self.options.sticky_timeout.as_millis() as u64));
                requeue = !row.pending.is_empty();
            }
            store.leases.remove(&instance_id);
            if requeue {
                store.enqueue(instance_id);
            }
        }
        self.workflow_wake.notify_waiters();
        self.activity_wake.notify_waiters();
        Ok(())
    }

    async fn signal_workflow_instance(
        &self,
        instance_id: &InstanceId,
        event: Event,
    ) -> Result<(), BackendError> {
        {
            let mut store = self.store.lock();
            if !store.push_pending_to(instance_id, event) {
                return Err(BackendError::InstanceNotFound(*instance_id));
            }
            store.enqueue(*instance_id);
        }
        self.workflow_wake.notify_waiters();
        Ok(())
    }

    async fn cancel_workflow_instance(
        &self,
        instance_id: &InstanceId,
        event: Event,
    ) -> Result<(), BackendError> {
        self.signal_workflow_instance(instance_id, event).await
    }

    async fn get_activity_task(&self) -> Result<Option<ActivityTask>, BackendError> {
        let deadline = tokio::time::Instant::now() + self.options.block_timeout;
        loop {
            let notified = self.activity_wake.notified();
            {
                let mut store = self.store.lock();
                let now = self.now();
                let lease_until = now + self.options.activity_lock_timeout.as_millis() as u64;
                for row in store.activities.iter_mut() {
                    match row.leased_until {
                        Some(until) if until > now => continue,
                        Some(_) => {
                            // Lease expired: redeliver, at least once.
                            row.attempt += 1;
                            tracing::warn!(
                                activity_id = %row.id,
                                attempt = row.attempt,
                                "activity lease expired; redelivering"
                            );
                        }
                        None => {}
                    }
                    row.leased_until = Some(lease_until);
                    return Ok(Some(ActivityTask {
                        id: row.id,
                        instance: row.instance.clone(),
                        event: row.event.clone(),
                        attempt: row.attempt,
                    }));
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn extend_activity_task(&self, activity_id: &Uuid) -> Result<(), BackendError> {
        let mut store = self.store.lock();
        let lease_until = self.now() + self.options.activity_lock_timeout.as_millis() as u64;
        let row = store
            .activities
            .iter_mut()
            .find(|row| row.id == *activity_id)
            .ok_or(BackendError::ActivityNotFound(*activity_id))?;
        row.leased_until = Some(lease_until);
        Ok(())
    }

    async fn complete_activity_task(
        &self,
        instance: &WorkflowInstance,
        activity_id: &Uuid,
        result_event: Event,
    ) -> Result<(), BackendError> {
        {
            let mut store = self.store.lock();
            let position = store
                .activities
                .iter()
                .position(|row| {
                    row.id == *activity_id
                        && row.instance.execution_id == instance.execution_id
                })
                .ok_or(BackendError::ActivityNotFound(*activity_id))?;
            store.activities.remove(position);

            if !store.push_pending_to(&instance.instance_id, result_event) {
                tracing::warn!(
                    instance_id = %instance.instance_id,
                    "dropping activity result for unknown instance"
                );
                return Ok(());
            }
            store.enqueue(instance.instance_id);
        }
        self.workflow_wake.notify_waiters();
        Ok(())
    }

    async fn get_workflow_instance_history(
        &self,
        instance_id: &InstanceId,
        from_sequence_id: u64,
    ) -> Result<Vec<Event>, BackendError> {
        let store = self.store.lock();
        let row = store
            .instances
            .get(instance_id)
            .ok_or(BackendError::InstanceNotFound(*instance_id))?;
        Ok(row
            .history
            .iter()
            .filter(|event| event.sequence_id > from_sequence_id)
            .cloned()
            .collect())
    }

    async fn get_workflow_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<InstanceState, BackendError> {
        let store = self.store.lock();
        let row = store
            .instances
            .get(instance_id)
            .ok_or(BackendError::InstanceNotFound(*instance_id))?;
        Ok(row.state)
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
