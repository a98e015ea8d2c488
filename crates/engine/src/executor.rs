// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic turn execution.
//!
//! Replay feeds recorded history through a fresh scheduler, matching the
//! commands the workflow code re-issues against the events that committed
//! them in earlier turns. New events are then applied the same way, and
//! the commands left pending at the end are translated into this turn's
//! new history events and side outputs.

use crate::context::WorkflowContext;
use crate::error::ExecutorError;
use crate::registry::Registry;
use crate::state::{SharedState, WorkflowState};
use lh_core::{
    Command, CommandKind, CommandState, Event, EventKind, ExecutionId, InstanceState, Metadata,
    Payload, WorkflowError, WorkflowEvent, WorkflowInstance, WorkflowTask,
};
use lh_sync::{Context, Scheduler};
use std::rc::Rc;

/// Everything a completed turn hands to the backend for checkpointing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Applied new events plus command-derived events, with dense
    /// sequence ids continuing from the task's `last_sequence_id`.
    pub executed_events: Vec<Event>,
    /// `ActivityScheduled` events to enqueue as activity tasks.
    pub activity_events: Vec<Event>,
    /// Future events to register (timer fires for this instance).
    pub timer_events: Vec<Event>,
    /// Cross-instance messages.
    pub workflow_events: Vec<WorkflowEvent>,
    /// Instance state after this turn.
    pub state: InstanceState,
}

struct Turn {
    scheduler: Scheduler,
    state: SharedState,
    root_ctx: Context,
}

/// Executes one workflow turn against the registered workflow functions.
pub struct WorkflowExecutor<'r> {
    registry: &'r Registry,
}

impl<'r> WorkflowExecutor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Run the turn: replay `task.history`, apply `task.new_events`, and
    /// collect outputs. Synchronous; the caller owns the thread.
    pub fn execute(
        &self,
        task: &WorkflowTask,
        now_ms: u64,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut turn = Turn {
            scheduler: Scheduler::new(),
            state: WorkflowState::new(task.instance.clone()),
            root_ctx: Context::background(),
        };

        turn.state.borrow_mut().replaying = true;
        for event in &task.history {
            self.apply_event(&mut turn, event)?;
        }
        turn.state.borrow_mut().replaying = false;

        let mut executed_events: Vec<Event> = Vec::with_capacity(task.new_events.len());
        for event in &task.new_events {
            self.apply_event(&mut turn, event)?;
            executed_events.push(event.clone());
        }

        let mut result = self.translate_commands(&turn, task, now_ms);
        let mut command_events = std::mem::take(&mut result.executed_events);
        executed_events.append(&mut command_events);

        let mut sequence_id = task.last_sequence_id;
        for event in executed_events.iter_mut() {
            sequence_id += 1;
            event.sequence_id = sequence_id;
        }
        result.executed_events = executed_events;
        Ok(result)
    }

    fn apply_event(&self, turn: &mut Turn, event: &Event) -> Result<(), ExecutorError> {
        turn.state.borrow_mut().time = event.timestamp;

        match &event.kind {
            EventKind::WorkflowExecutionStarted { name, inputs, .. } => {
                self.start_workflow(turn, name, inputs.clone())?;
            }

            // Events that committed a command in an earlier turn; replay
            // must find the matching re-issued command.
            EventKind::ActivityScheduled { .. }
            | EventKind::TimerScheduled { .. }
            | EventKind::TimerCanceled {}
            | EventKind::SubWorkflowScheduled { .. }
            | EventKind::SubWorkflowCancellationRequested { .. }
            | EventKind::SignalWorkflowScheduled { .. }
            | EventKind::WorkflowExecutionFinished { .. } => {
                commit_command(&turn.state, event)?;
            }

            EventKind::WorkflowExecutionCanceled {} => {
                if event.schedule_event_id == 0 {
                    // External cancellation request.
                    turn.root_ctx.cancel();
                } else {
                    // Terminal event of a canceled execution.
                    commit_command(&turn.state, event)?;
                }
            }

            EventKind::ActivityCompleted { result }
            | EventKind::SubWorkflowCompleted { result }
            | EventKind::SideEffectResult { result } => {
                turn.state.borrow_mut().resolve_future(event.schedule_event_id, Some(result));
            }

            EventKind::ActivityFailed { error } | EventKind::SubWorkflowFailed { error } => {
                turn.state.borrow_mut().reject_future(event.schedule_event_id, error.clone());
            }

            EventKind::TimerFired { .. } => {
                turn.state.borrow_mut().resolve_future(event.schedule_event_id, None);
            }

            EventKind::SignalWorkflowDelivered { error } => {
                let mut state = turn.state.borrow_mut();
                match error {
                    None => state.resolve_future(event.schedule_event_id, None),
                    Some(error) => state.reject_future(event.schedule_event_id, error.clone()),
                }
            }

            EventKind::SignalReceived { name, arg } => {
                turn.state.borrow_mut().deliver_signal(name, arg.clone());
            }

            // Recorded by operator surfaces; nothing for the turn to drive.
            EventKind::WorkflowExecutionTerminated { .. }
            | EventKind::WorkflowExecutionContinuedAsNew { .. } => {}
        }

        turn.scheduler.execute();
        Ok(())
    }

    fn start_workflow(
        &self,
        turn: &mut Turn,
        name: &str,
        inputs: Vec<Payload>,
    ) -> Result<(), ExecutorError> {
        {
            let mut state = turn.state.borrow_mut();
            if state.started {
                return Err(ExecutorError::DuplicateStart);
            }
            state.started = true;
        }
        let workflow_fn = self
            .registry
            .workflow(name)
            .ok_or_else(|| ExecutorError::WorkflowNotFound(name.to_string()))?;

        let ctx = WorkflowContext::new(Rc::clone(&turn.state), turn.root_ctx.clone());
        let state = Rc::clone(&turn.state);
        let body = workflow_fn(ctx, inputs);
        turn.scheduler.spawn(async move {
            let outcome = body.await;
            let mut state = state.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            let id = state.next_schedule_event_id();
            let (result, error) = match outcome {
                Ok(result) => (result, None),
                Err(error) => (None, Some(error)),
            };
            state.add_command(Command::new(id, CommandKind::CompleteWorkflow { result, error }));
        });
        Ok(())
    }

    fn translate_commands(&self, turn: &Turn, task: &WorkflowTask, now_ms: u64) -> ExecutionResult {
        let mut state = turn.state.borrow_mut();
        let instance = state.instance.clone();
        let commands: Vec<_> = state.commands.drain(..).collect();
        drop(state);

        let mut events = Vec::new();
        let mut activity_events = Vec::new();
        let mut timer_events = Vec::new();
        let mut workflow_events = Vec::new();
        let mut instance_state = task.state;

        for command in commands {
            let mut command = command.borrow_mut();
            if command.state != CommandState::Pending {
                continue;
            }
            let schedule_event_id = command.event_schedule_id();

            match &command.kind {
                CommandKind::ScheduleActivity { name, inputs } => {
                    let event = Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::ActivityScheduled {
                            name: name.clone(),
                            inputs: inputs.clone(),
                        },
                    );
                    activity_events.push(event.clone());
                    events.push(event);
                }

                CommandKind::ScheduleTimer { at } => {
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::TimerScheduled { at: *at },
                    ));
                    // The fire carries the due time as its timestamp, so
                    // deterministic time observed after the fire is never
                    // earlier than schedule time + delay.
                    timer_events.push(Event::future(
                        *at,
                        schedule_event_id,
                        EventKind::TimerFired { at: *at },
                        *at,
                    ));
                }

                CommandKind::CancelTimer { .. } => {
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::TimerCanceled {},
                    ));
                }

                CommandKind::ScheduleSubWorkflow { instance_id, name, inputs } => {
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::SubWorkflowScheduled {
                            instance_id: *instance_id,
                            name: name.clone(),
                            inputs: inputs.clone(),
                        },
                    ));
                    let child = WorkflowInstance::sub_workflow(
                        *instance_id,
                        instance.instance_id,
                        schedule_event_id,
                    );
                    workflow_events.push(WorkflowEvent {
                        instance: child,
                        event: Event::new(
                            now_ms,
                            EventKind::WorkflowExecutionStarted {
                                name: name.clone(),
                                inputs: inputs.clone(),
                                metadata: Metadata::default(),
                            },
                        ),
                    });
                }

                CommandKind::CancelSubWorkflow { instance_id } => {
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::SubWorkflowCancellationRequested { instance_id: *instance_id },
                    ));
                    workflow_events.push(WorkflowEvent {
                        instance: WorkflowInstance::with_execution(
                            *instance_id,
                            ExecutionId::from_string(""),
                        ),
                        event: Event::new(now_ms, EventKind::WorkflowExecutionCanceled {}),
                    });
                }

                CommandKind::SignalWorkflow { instance_id, name, arg } => {
                    // Delivery and the response event are the backend's
                    // half, driven from this history event inside the
                    // checkpoint transaction.
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::SignalWorkflowScheduled {
                            instance_id: *instance_id,
                            name: name.clone(),
                            arg: arg.clone(),
                        },
                    ));
                }

                CommandKind::SideEffect { result } => {
                    events.push(Event::with_schedule_id(
                        now_ms,
                        schedule_event_id,
                        EventKind::SideEffectResult { result: result.clone() },
                    ));
                }

                CommandKind::CompleteWorkflow { result, error } => {
                    instance_state = InstanceState::Finished;
                    let terminal = match error {
                        Some(WorkflowError::Canceled) => EventKind::WorkflowExecutionCanceled {},
                        _ => EventKind::WorkflowExecutionFinished {
                            result: result.clone(),
                            error: error.clone(),
                        },
                    };
                    events.push(Event::with_schedule_id(now_ms, schedule_event_id, terminal));

                    if let Some(parent) = &instance.parent {
                        let kind = match error {
                            None => EventKind::SubWorkflowCompleted {
                                result: result.clone().unwrap_or_else(Payload::null),
                            },
                            Some(error) => {
                                EventKind::SubWorkflowFailed { error: error.clone() }
                            }
                        };
                        workflow_events.push(WorkflowEvent {
                            instance: WorkflowInstance::with_execution(
                                parent.instance_id,
                                ExecutionId::from_string(""),
                            ),
                            event: Event::with_schedule_id(now_ms, parent.schedule_event_id, kind),
                        });
                    }
                }
            }
            command.state = CommandState::Committed;
        }

        ExecutionResult {
            executed_events: events,
            activity_events,
            timer_events,
            workflow_events,
            state: instance_state,
        }
    }
}

/// Match a history event against the command replay re-issued for it.
fn commit_command(state: &SharedState, event: &Event) -> Result<(), ExecutorError> {
    let mut state = state.borrow_mut();
    let position = state.commands.iter().position(|c| {
        let c = c.borrow();
        c.state == CommandState::Pending && c.event_schedule_id() == event.schedule_event_id
    });
    let Some(position) = position else {
        return Err(ExecutorError::NonDeterminism {
            event: event.type_name(),
            schedule_event_id: event.schedule_event_id,
            found: "no pending command with this schedule event id".to_string(),
        });
    };
    let command = state.commands.remove(position);
    let mut command = command.borrow_mut();
    if !command.commits_with(&event.kind) {
        return Err(ExecutorError::NonDeterminism {
            event: event.type_name(),
            schedule_event_id: event.schedule_event_id,
            found: format!("command {}", command.kind_name()),
        });
    }
    command.state = CommandState::Committed;
    Ok(())
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
