// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The context handed to workflow functions: every durable operation a
//! workflow can perform goes through here.
//!
//! Each scheduling call allocates the next schedule event id, records a
//! command, and tracks a decoding future in the arena. Cancellation
//! callbacks drop commands that never committed and emit cancel commands
//! for those that did.

use crate::retry::{with_retries, ActivityOptions};
use crate::state::{SharedState, TrackedFuture};
use lh_core::{
    to_payload, Command, CommandKind, CommandState, InstanceId, Payload, WorkflowError,
    WorkflowInstance,
};
use lh_sync::{CancelFunc, Channel, Context, Future};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

/// Options for scheduling a sub-workflow.
#[derive(Debug, Clone, Default)]
pub struct SubWorkflowOptions {
    /// Instance id for the child. When unset, a deterministic id is
    /// derived from the parent instance and the schedule event id, so
    /// replay regenerates the same child address.
    pub instance_id: Option<InstanceId>,
}

/// Workflow-side execution context.
#[derive(Clone)]
pub struct WorkflowContext {
    pub(crate) state: SharedState,
    pub(crate) ctx: Context,
}

impl std::ops::Deref for WorkflowContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl WorkflowContext {
    pub(crate) fn new(state: SharedState, ctx: Context) -> Self {
        Self { state, ctx }
    }

    /// Deterministic time: the timestamp of the most recently applied
    /// event, in epoch milliseconds. Never the wall clock.
    pub fn now(&self) -> u64 {
        self.state.borrow().time
    }

    /// Whether this turn is currently replaying recorded history.
    pub fn is_replaying(&self) -> bool {
        self.state.borrow().replaying
    }

    pub fn instance(&self) -> WorkflowInstance {
        self.state.borrow().instance.clone()
    }

    /// A child context whose cancellation is controlled by the caller.
    pub fn with_cancel(&self) -> (WorkflowContext, CancelFunc) {
        let (child, cancel) = self.ctx.with_cancel();
        (Self { state: Rc::clone(&self.state), ctx: child }, cancel)
    }

    /// Schedule a single activity attempt.
    pub fn schedule_activity<T>(&self, name: &str, inputs: Vec<Payload>) -> Future<T>
    where
        T: DeserializeOwned + Clone + 'static,
    {
        let future = Future::new();
        if self.ctx.is_canceled() {
            let _ = future.set(Err(WorkflowError::Canceled));
            return future;
        }

        let schedule_event_id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_schedule_event_id();
            state.add_command(Command::new(
                id,
                CommandKind::ScheduleActivity { name: name.to_string(), inputs },
            ));
            state.track_future(id, Box::new(TrackedFuture::json(future.clone())));
            id
        };

        self.drop_if_uncommitted_on_cancel(schedule_event_id, future.clone());
        future
    }

    /// Execute an activity with the retry policy applied inside workflow
    /// code: every attempt is a fresh `schedule_activity` with its own
    /// schedule event id.
    pub async fn activity<T>(
        &self,
        name: &str,
        inputs: Vec<Payload>,
        options: ActivityOptions,
    ) -> Result<T, WorkflowError>
    where
        T: DeserializeOwned + Clone + 'static,
    {
        let name = name.to_string();
        with_retries(self, options.retry, move |ctx, _attempt| {
            ctx.schedule_activity::<T>(&name, inputs.clone())
        })
        .await
    }

    /// Schedule a durable timer firing `delay` after the current
    /// deterministic time.
    pub fn timer(&self, delay: Duration) -> Future<()> {
        let future: Future<()> = Future::new();
        if self.ctx.is_canceled() {
            let _ = future.set(Err(WorkflowError::Canceled));
            return future;
        }

        let command = {
            let mut state = self.state.borrow_mut();
            let id = state.next_schedule_event_id();
            let at = state.time + delay.as_millis() as u64;
            let command = state.add_command(Command::new(id, CommandKind::ScheduleTimer { at }));
            state.track_future(id, Box::new(TrackedFuture::unit(future.clone())));
            command
        };

        // On cancellation: a timer that never committed is dropped; a
        // committed timer gets a cancel command removing its future event.
        // Either way the local future resolves as canceled, and a fire
        // that already materialized is benign.
        let state = Rc::clone(&self.state);
        let cancel_future = future.clone();
        self.ctx.on_cancel(move || {
            if cancel_future.ready() {
                return;
            }
            let mut state = state.borrow_mut();
            let mut command = command.borrow_mut();
            match command.state {
                CommandState::Pending => {
                    command.state = CommandState::Canceled;
                }
                CommandState::Committed => {
                    let cancel_id = state.next_schedule_event_id();
                    state.add_command(Command::new(
                        cancel_id,
                        CommandKind::CancelTimer { timer_schedule_event_id: command.id },
                    ));
                }
                CommandState::Canceled => return,
            }
            state.remove_future(command.id);
            let _ = cancel_future.set(Err(WorkflowError::Canceled));
        });

        future
    }

    /// Schedule a sub-workflow and await its completion through the
    /// returned future.
    pub fn sub_workflow<T>(
        &self,
        options: SubWorkflowOptions,
        name: &str,
        inputs: Vec<Payload>,
    ) -> Future<T>
    where
        T: DeserializeOwned + Clone + 'static,
    {
        let future = Future::new();
        if self.ctx.is_canceled() {
            let _ = future.set(Err(WorkflowError::Canceled));
            return future;
        }

        let (command, child_id) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_schedule_event_id();
            let child_id = options.instance_id.unwrap_or_else(|| {
                InstanceId::from_string(format!("{}:{}", state.instance.instance_id, id))
            });
            let command = state.add_command(Command::new(
                id,
                CommandKind::ScheduleSubWorkflow {
                    instance_id: child_id,
                    name: name.to_string(),
                    inputs,
                },
            ));
            state.track_future(id, Box::new(TrackedFuture::json(future.clone())));
            (command, child_id)
        };

        // Unlike timers, a committed sub-workflow is only *requested* to
        // cancel; the future stays open until the child reports back.
        let state = Rc::clone(&self.state);
        let cancel_future = future.clone();
        self.ctx.on_cancel(move || {
            if cancel_future.ready() {
                return;
            }
            let mut state = state.borrow_mut();
            let mut command = command.borrow_mut();
            match command.state {
                CommandState::Pending => {
                    command.state = CommandState::Canceled;
                    state.remove_future(command.id);
                    drop(command);
                    drop(state);
                    let _ = cancel_future.set(Err(WorkflowError::Canceled));
                }
                CommandState::Committed => {
                    let cancel_id = state.next_schedule_event_id();
                    state.add_command(Command::new(
                        cancel_id,
                        CommandKind::CancelSubWorkflow { instance_id: child_id },
                    ));
                }
                CommandState::Canceled => {}
            }
        });

        future
    }

    /// Send a signal to another instance. The future resolves once the
    /// delivery outcome is recorded; an unknown target resolves with
    /// [`WorkflowError::InstanceNotFound`].
    pub fn signal_workflow(&self, instance_id: InstanceId, name: &str, arg: Payload) -> Future<()> {
        let future: Future<()> = Future::new();
        if self.ctx.is_canceled() {
            let _ = future.set(Err(WorkflowError::Canceled));
            return future;
        }

        let schedule_event_id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_schedule_event_id();
            state.add_command(Command::new(
                id,
                CommandKind::SignalWorkflow { instance_id, name: name.to_string(), arg },
            ));
            state.track_future(id, Box::new(TrackedFuture::unit(future.clone())));
            id
        };

        self.drop_if_uncommitted_on_cancel(schedule_event_id, future.clone());
        future
    }

    /// Record a non-deterministic value once; replays read it back from
    /// history instead of re-running the closure.
    pub fn side_effect<T, F>(&self, effect: F) -> Future<T>
    where
        T: Serialize + DeserializeOwned + Clone + 'static,
        F: FnOnce() -> T,
    {
        let future = Future::new();
        let mut state = self.state.borrow_mut();
        let id = state.next_schedule_event_id();
        if state.replaying {
            state.track_future(id, Box::new(TrackedFuture::json(future.clone())));
        } else {
            let value = effect();
            match to_payload(&value) {
                Ok(result) => {
                    state.add_command(Command::new(id, CommandKind::SideEffect { result }));
                    let _ = future.set(Ok(value));
                }
                Err(e) => {
                    let _ = future.set(Err(e.into()));
                }
            }
        }
        future
    }

    /// The channel receiving signals of the given name.
    pub fn signal_channel<T>(&self, name: &str) -> SignalChannel<T>
    where
        T: DeserializeOwned,
    {
        let channel = self.state.borrow_mut().signal_channel(name);
        SignalChannel { name: name.to_string(), channel, _marker: PhantomData }
    }

    /// Shared cancel handling for commands whose future resolves from a
    /// later event: drop the command if it never committed.
    fn drop_if_uncommitted_on_cancel<T: Clone + 'static>(
        &self,
        schedule_event_id: u64,
        future: Future<T>,
    ) {
        let state = Rc::clone(&self.state);
        self.ctx.on_cancel(move || {
            let mut state = state.borrow_mut();
            let Some(command) =
                state.commands.iter().find(|c| c.borrow().id == schedule_event_id).cloned()
            else {
                return;
            };
            let mut command = command.borrow_mut();
            if command.state == CommandState::Pending {
                command.state = CommandState::Canceled;
                state.remove_future(schedule_event_id);
                drop(command);
                drop(state);
                let _ = future.set(Err(WorkflowError::Canceled));
            }
        });
    }
}

/// Typed view over an instance's named signal bus.
pub struct SignalChannel<T> {
    name: String,
    channel: Channel<Payload>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> SignalChannel<T> {
    /// Suspend until a signal arrives. `None` when the context cancels.
    pub async fn receive(&self, ctx: &Context) -> Option<T> {
        loop {
            let arg = self.channel.receive(ctx).await?;
            match lh_core::from_payload::<T>(&arg) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::warn!(signal = %self.name, error = %e, "discarding undecodable signal");
                }
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_receive(&self) -> Option<T> {
        loop {
            let arg = self.channel.try_receive()?;
            match lh_core::from_payload::<T>(&arg) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::warn!(signal = %self.name, error = %e, "discarding undecodable signal");
                }
            }
        }
    }

    /// The raw payload channel, for use in selects.
    pub fn raw(&self) -> Channel<Payload> {
        self.channel.clone()
    }
}
