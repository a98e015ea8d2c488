// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tables mirroring the relational layout: instances with their
//! history and pending streams, the future-event set, activity tasks, and
//! the workflow queue with its companion queued-set guard.

use crate::options::BackendOptions;
use lh_core::{
    Event, InstanceId, InstanceState, Metadata, TaskId, WorkerId, WorkflowInstance, WorkflowTask,
};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

pub(crate) struct InstanceRow {
    pub(crate) instance: WorkflowInstance,
    pub(crate) metadata: Metadata,
    pub(crate) state: InstanceState,
    pub(crate) created_at: u64,
    pub(crate) completed_at: Option<u64>,
    pub(crate) last_sequence_id: u64,
    pub(crate) history: Vec<Event>,
    /// FIFO pending-event stream with arrival sequence numbers.
    pub(crate) pending: VecDeque<(u64, Event)>,
    pub(crate) next_arrival_seq: u64,
    /// Worker preferred for the next task, and until when.
    pub(crate) sticky: Option<(WorkerId, u64)>,
}

impl InstanceRow {
    pub(crate) fn new(instance: WorkflowInstance, metadata: Metadata, now: u64) -> Self {
        Self {
            instance,
            metadata,
            state: InstanceState::Active,
            created_at: now,
            completed_at: None,
            last_sequence_id: 0,
            history: Vec::new(),
            pending: VecDeque::new(),
            next_arrival_seq: 1,
            sticky: None,
        }
    }

    pub(crate) fn push_pending(&mut self, event: Event) {
        let seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;
        self.pending.push_back((seq, event));
    }
}

pub(crate) struct WorkflowLease {
    pub(crate) task_id: TaskId,
    pub(crate) worker: WorkerId,
    pub(crate) leased_until: u64,
}

pub(crate) struct FutureEventRow {
    pub(crate) visible_at: u64,
    pub(crate) instance_id: InstanceId,
    pub(crate) schedule_event_id: u64,
    pub(crate) event: Event,
}

pub(crate) struct ActivityRow {
    pub(crate) id: Uuid,
    pub(crate) instance: WorkflowInstance,
    pub(crate) event: Event,
    pub(crate) attempt: u32,
    pub(crate) leased_until: Option<u64>,
}

#[derive(Default)]
pub(crate) struct Store {
    pub(crate) instances: HashMap<InstanceId, InstanceRow>,
    /// FIFO task queue by enqueue time.
    pub(crate) queue: VecDeque<InstanceId>,
    /// Companion set guard: an instance is enqueued only while absent here.
    pub(crate) queued: HashSet<InstanceId>,
    pub(crate) leases: HashMap<InstanceId, WorkflowLease>,
    pub(crate) future_events: Vec<FutureEventRow>,
    pub(crate) activities: Vec<ActivityRow>,
}

impl Store {
    /// Idempotent enqueue guarded by the queued set.
    pub(crate) fn enqueue(&mut self, instance_id: InstanceId) {
        if self.queued.insert(instance_id) {
            self.queue.push_back(instance_id);
        }
    }

    /// Move every due future event into its target's pending stream and
    /// enqueue the target. Stale entries must never survive a scan.
    pub(crate) fn materialize_due_future_events(&mut self, now: u64) {
        let mut due = Vec::new();
        let mut index = 0;
        while index < self.future_events.len() {
            if self.future_events[index].visible_at <= now {
                due.push(self.future_events.remove(index));
            } else {
                index += 1;
            }
        }
        due.sort_by_key(|row| row.visible_at);

        for row in due {
            let Some(target) = self.instances.get_mut(&row.instance_id) else {
                tracing::warn!(instance_id = %row.instance_id, "dropping future event for unknown instance");
                continue;
            };
            let mut event = row.event;
            event.visible_at = None;
            target.push_pending(event);
            self.enqueue(row.instance_id);
        }
    }

    /// Release expired leases so the instance becomes claimable again.
    /// Nothing from the abandoned turn was checkpointed, so re-execution
    /// from durable state is safe.
    pub(crate) fn reap_expired_leases(&mut self, now: u64) {
        let expired: Vec<InstanceId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.leased_until <= now)
            .map(|(id, _)| *id)
            .collect();
        for instance_id in expired {
            tracing::warn!(instance_id = %instance_id, "workflow task lease expired; requeueing");
            self.leases.remove(&instance_id);
            if self.instances.get(&instance_id).is_some_and(|row| !row.pending.is_empty()) {
                self.enqueue(instance_id);
            }
        }
    }

    /// Dequeue the first claimable instance: FIFO, skipping instances
    /// leased elsewhere and instances sticky to a different worker.
    pub(crate) fn dequeue(
        &mut self,
        worker: &WorkerId,
        now: u64,
        options: &BackendOptions,
    ) -> Option<WorkflowTask> {
        let mut position = None;
        for (index, instance_id) in self.queue.iter().enumerate() {
            if self.leases.contains_key(instance_id) {
                continue;
            }
            let Some(row) = self.instances.get(instance_id) else {
                continue;
            };
            if let Some((sticky_worker, sticky_until)) = &row.sticky {
                if *sticky_until > now && sticky_worker != worker {
                    continue;
                }
            }
            position = Some(index);
            break;
        }

        let position = position?;
        let instance_id = self.queue.remove(position)?;
        self.queued.remove(&instance_id);

        let row = self.instances.get(&instance_id)?;
        let task_id = TaskId::new();
        self.leases.insert(
            instance_id,
            WorkflowLease {
                task_id,
                worker: *worker,
                leased_until: now + options.workflow_lock_timeout.as_millis() as u64,
            },
        );

        let new_events: Vec<Event> = row.pending.iter().map(|(_, event)| event.clone()).collect();
        let custom_data = row.pending.back().map(|(seq, _)| *seq).unwrap_or(0);
        Some(WorkflowTask {
            id: task_id,
            instance: row.instance.clone(),
            state: row.state,
            metadata: row.metadata.clone(),
            last_sequence_id: row.last_sequence_id,
            history: row.history.clone(),
            new_events,
            custom_data,
        })
    }

    /// Append an event to an instance's pending stream, if it exists.
    pub(crate) fn push_pending_to(&mut self, instance_id: &InstanceId, event: Event) -> bool {
        match self.instances.get_mut(instance_id) {
            Some(row) => {
                row.push_pending(event);
                true
            }
            None => false,
        }
    }
}
