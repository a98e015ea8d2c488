// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands: intents emitted by workflow code during a turn.
//!
//! Commands never cross a turn boundary raw; at checkpoint they are
//! translated into new history events. During replay, events that committed
//! a command in an earlier turn are matched back against the re-issued
//! command to detect non-deterministic workflow code.

use crate::error::WorkflowError;
use crate::event::EventKind;
use crate::instance::InstanceId;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Issued this turn, not yet translated or persisted.
    Pending,
    /// Persisted to history (matched during replay, or translated at commit).
    Committed,
    /// Dropped before persisting; translation skips it.
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Schedule event id, allocated from the per-instance monotonic counter.
    pub id: u64,
    pub state: CommandState,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandKind {
    ScheduleActivity {
        name: String,
        inputs: Vec<Payload>,
    },
    ScheduleSubWorkflow {
        instance_id: InstanceId,
        name: String,
        inputs: Vec<Payload>,
    },
    ScheduleTimer {
        at: u64,
    },
    CancelTimer {
        /// Schedule event id of the timer being canceled; the produced
        /// `TimerCanceled` event carries this id so the backend can drop
        /// the matching future event.
        timer_schedule_event_id: u64,
    },
    CancelSubWorkflow {
        instance_id: InstanceId,
    },
    SignalWorkflow {
        instance_id: InstanceId,
        name: String,
        arg: Payload,
    },
    SideEffect {
        result: Payload,
    },
    CompleteWorkflow {
        result: Option<Payload>,
        error: Option<WorkflowError>,
    },
}

impl Command {
    pub fn new(id: u64, kind: CommandKind) -> Self {
        Self { id, state: CommandState::Pending, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            CommandKind::ScheduleActivity { .. } => "schedule_activity",
            CommandKind::ScheduleSubWorkflow { .. } => "schedule_sub_workflow",
            CommandKind::ScheduleTimer { .. } => "schedule_timer",
            CommandKind::CancelTimer { .. } => "cancel_timer",
            CommandKind::CancelSubWorkflow { .. } => "cancel_sub_workflow",
            CommandKind::SignalWorkflow { .. } => "signal_workflow",
            CommandKind::SideEffect { .. } => "side_effect",
            CommandKind::CompleteWorkflow { .. } => "complete_workflow",
        }
    }

    /// The schedule event id the command's history event will carry.
    ///
    /// Identical to `id` except for timer cancellation, whose event points
    /// back at the canceled timer.
    pub fn event_schedule_id(&self) -> u64 {
        match self.kind {
            CommandKind::CancelTimer { timer_schedule_event_id } => timer_schedule_event_id,
            _ => self.id,
        }
    }

    /// Whether a history event of the given kind commits this command.
    pub fn commits_with(&self, event: &EventKind) -> bool {
        matches!(
            (&self.kind, event),
            (CommandKind::ScheduleActivity { .. }, EventKind::ActivityScheduled { .. })
                | (CommandKind::ScheduleSubWorkflow { .. }, EventKind::SubWorkflowScheduled { .. })
                | (CommandKind::ScheduleTimer { .. }, EventKind::TimerScheduled { .. })
                | (CommandKind::CancelTimer { .. }, EventKind::TimerCanceled {})
                | (
                    CommandKind::CancelSubWorkflow { .. },
                    EventKind::SubWorkflowCancellationRequested { .. }
                )
                | (CommandKind::SignalWorkflow { .. }, EventKind::SignalWorkflowScheduled { .. })
                | (CommandKind::SideEffect { .. }, EventKind::SideEffectResult { .. })
                | (
                    CommandKind::CompleteWorkflow { .. },
                    EventKind::WorkflowExecutionFinished { .. }
                )
                | (CommandKind::CompleteWorkflow { .. }, EventKind::WorkflowExecutionCanceled {})
        )
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
