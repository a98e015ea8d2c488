// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History events.
//!
//! An event is the unit of durability: everything a workflow instance ever
//! did or observed is an ordered sequence of these. Events are immutable
//! once appended to history.
//!
//! Serializes with `{"type": "...", "attributes": {...}}` plus the common
//! envelope fields, so the wire shape is stable regardless of variant.

use crate::error::WorkflowError;
use crate::instance::{InstanceId, Metadata, WorkflowInstance};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common event envelope.
///
/// `sequence_id` is zero until the event is executed into history, at which
/// point the executor assigns the next dense per-instance sequence number.
/// `schedule_event_id` is zero for events that do not correlate to a
/// scheduling command (externally delivered signals, cancellation requests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(default)]
    pub sequence_id: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Epoch milliseconds at which the event was produced.
    pub timestamp: u64,
    #[serde(default)]
    pub schedule_event_id: u64,
    /// For future events: epoch milliseconds at which the event becomes
    /// visible in the target instance's pending stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_at: Option<u64>,
}

impl Event {
    /// An event with no command correlation (signals, cancel requests).
    pub fn new(timestamp: u64, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_id: 0,
            kind,
            timestamp,
            schedule_event_id: 0,
            visible_at: None,
        }
    }

    /// An event correlated to the command with the given schedule event id.
    pub fn with_schedule_id(timestamp: u64, schedule_event_id: u64, kind: EventKind) -> Self {
        Self { schedule_event_id, ..Self::new(timestamp, kind) }
    }

    /// A future event, visible no earlier than `visible_at`.
    pub fn future(
        timestamp: u64,
        schedule_event_id: u64,
        kind: EventKind,
        visible_at: u64,
    ) -> Self {
        Self {
            visible_at: Some(visible_at),
            ..Self::with_schedule_id(timestamp, schedule_event_id, kind)
        }
    }

    /// Stable wire name of the event type, for logs and errors.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Event type plus its type-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes")]
pub enum EventKind {
    WorkflowExecutionStarted {
        name: String,
        inputs: Vec<Payload>,
        #[serde(default)]
        metadata: Metadata,
    },
    WorkflowExecutionFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Payload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WorkflowError>,
    },
    WorkflowExecutionTerminated {
        reason: String,
    },
    WorkflowExecutionCanceled {},
    WorkflowExecutionContinuedAsNew {
        inputs: Vec<Payload>,
    },
    ActivityScheduled {
        name: String,
        inputs: Vec<Payload>,
    },
    ActivityCompleted {
        result: Payload,
    },
    ActivityFailed {
        error: WorkflowError,
    },
    TimerScheduled {
        /// Epoch milliseconds at which the timer is due.
        at: u64,
    },
    TimerFired {
        at: u64,
    },
    TimerCanceled {},
    SignalReceived {
        name: String,
        arg: Payload,
    },
    SubWorkflowScheduled {
        instance_id: InstanceId,
        name: String,
        inputs: Vec<Payload>,
    },
    SubWorkflowCancellationRequested {
        instance_id: InstanceId,
    },
    SubWorkflowCompleted {
        result: Payload,
    },
    SubWorkflowFailed {
        error: WorkflowError,
    },
    SideEffectResult {
        result: Payload,
    },
    SignalWorkflowScheduled {
        instance_id: InstanceId,
        name: String,
        arg: Payload,
    },
    SignalWorkflowDelivered {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WorkflowError>,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            Self::WorkflowExecutionFinished { .. } => "WorkflowExecutionFinished",
            Self::WorkflowExecutionTerminated { .. } => "WorkflowExecutionTerminated",
            Self::WorkflowExecutionCanceled {} => "WorkflowExecutionCanceled",
            Self::WorkflowExecutionContinuedAsNew { .. } => "WorkflowExecutionContinuedAsNew",
            Self::ActivityScheduled { .. } => "ActivityScheduled",
            Self::ActivityCompleted { .. } => "ActivityCompleted",
            Self::ActivityFailed { .. } => "ActivityFailed",
            Self::TimerScheduled { .. } => "TimerScheduled",
            Self::TimerFired { .. } => "TimerFired",
            Self::TimerCanceled {} => "TimerCanceled",
            Self::SignalReceived { .. } => "SignalReceived",
            Self::SubWorkflowScheduled { .. } => "SubWorkflowScheduled",
            Self::SubWorkflowCancellationRequested { .. } => "SubWorkflowCancellationRequested",
            Self::SubWorkflowCompleted { .. } => "SubWorkflowCompleted",
            Self::SubWorkflowFailed { .. } => "SubWorkflowFailed",
            Self::SideEffectResult { .. } => "SideEffectResult",
            Self::SignalWorkflowScheduled { .. } => "SignalWorkflowScheduled",
            Self::SignalWorkflowDelivered { .. } => "SignalWorkflowDelivered",
        }
    }
}

/// A cross-instance message: an event destined for another (or a new)
/// workflow instance's pending stream.
///
/// Targets are logical: the receiving side routes by `instance.instance_id`
/// and only consults the rest of the struct when bootstrapping a new
/// instance from a `WorkflowExecutionStarted` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub instance: WorkflowInstance,
    pub event: Event,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
