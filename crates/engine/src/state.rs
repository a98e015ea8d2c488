// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-turn workflow state: the command log, the arena of in-flight
//! futures keyed by schedule event id, and the signal bus.

use lh_core::{
    from_payload, Command, Payload, WorkflowError, WorkflowInstance,
};
use lh_sync::Channel;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

pub(crate) type SharedState = Rc<RefCell<WorkflowState>>;
pub(crate) type SharedCommand = Rc<RefCell<Command>>;

/// A tracked future the executor can resolve from a recorded payload.
///
/// The decoder closure is captured at scheduling time, so resolution does
/// not need to know the concrete type.
pub(crate) trait ResolvableFuture {
    fn resolve(&self, payload: Option<&Payload>);
    fn reject(&self, error: WorkflowError);
}

pub(crate) struct TrackedFuture<T: Clone> {
    future: lh_sync::Future<T>,
    #[allow(clippy::type_complexity)]
    decode: Rc<dyn Fn(Option<&Payload>) -> Result<T, WorkflowError>>,
}

impl<T: Clone + 'static> TrackedFuture<T> {
    /// Resolution arrives as a payload decoded into `T`.
    pub(crate) fn json(future: lh_sync::Future<T>) -> Self
    where
        T: DeserializeOwned,
    {
        Self {
            future,
            decode: Rc::new(|payload| match payload {
                Some(payload) => Ok(from_payload::<T>(payload)?),
                None => Err(WorkflowError::failure("missing result payload")),
            }),
        }
    }
}

impl TrackedFuture<()> {
    /// Resolution carries no payload (timers, signal deliveries).
    pub(crate) fn unit(future: lh_sync::Future<()>) -> Self {
        Self { future, decode: Rc::new(|_| Ok(())) }
    }
}

impl<T: Clone> ResolvableFuture for TrackedFuture<T> {
    fn resolve(&self, payload: Option<&Payload>) {
        if self.future.set((self.decode)(payload)).is_err() {
            tracing::debug!("dropping resolution for already-resolved future");
        }
    }

    fn reject(&self, error: WorkflowError) {
        if self.future.set(Err(error)).is_err() {
            tracing::debug!("dropping rejection for already-resolved future");
        }
    }
}

pub(crate) struct WorkflowState {
    pub(crate) instance: WorkflowInstance,
    /// Commands issued this turn that have not been committed by replay.
    pub(crate) commands: Vec<SharedCommand>,
    futures: HashMap<u64, Box<dyn ResolvableFuture>>,
    signal_channels: HashMap<String, Channel<Payload>>,
    /// Signals that arrived before a channel of their name existed,
    /// kept in arrival order per name.
    buffered_signals: HashMap<String, VecDeque<Payload>>,
    next_schedule_event_id: u64,
    /// Timestamp of the most recently applied event; the only time
    /// observable from workflow code.
    pub(crate) time: u64,
    pub(crate) replaying: bool,
    pub(crate) started: bool,
    pub(crate) finished: bool,
}

impl WorkflowState {
    pub(crate) fn new(instance: WorkflowInstance) -> SharedState {
        Rc::new(RefCell::new(Self {
            instance,
            commands: Vec::new(),
            futures: HashMap::new(),
            signal_channels: HashMap::new(),
            buffered_signals: HashMap::new(),
            next_schedule_event_id: 1,
            time: 0,
            replaying: false,
            started: false,
            finished: false,
        }))
    }

    pub(crate) fn next_schedule_event_id(&mut self) -> u64 {
        let id = self.next_schedule_event_id;
        self.next_schedule_event_id += 1;
        id
    }

    pub(crate) fn add_command(&mut self, command: Command) -> SharedCommand {
        let command = Rc::new(RefCell::new(command));
        self.commands.push(Rc::clone(&command));
        command
    }

    pub(crate) fn track_future(&mut self, schedule_event_id: u64, future: Box<dyn ResolvableFuture>) {
        self.futures.insert(schedule_event_id, future);
    }

    pub(crate) fn remove_future(&mut self, schedule_event_id: u64) {
        self.futures.remove(&schedule_event_id);
    }

    /// Resolve a tracked future. Missing entries are benign: a canceled
    /// timer that fired anyway arrives here after its future was removed.
    pub(crate) fn resolve_future(&mut self, schedule_event_id: u64, payload: Option<&Payload>) {
        match self.futures.remove(&schedule_event_id) {
            Some(future) => future.resolve(payload),
            None => tracing::debug!(schedule_event_id, "no future for resolution; ignoring"),
        }
    }

    pub(crate) fn reject_future(&mut self, schedule_event_id: u64, error: WorkflowError) {
        match self.futures.remove(&schedule_event_id) {
            Some(future) => future.reject(error),
            None => tracing::debug!(schedule_event_id, "no future for rejection; ignoring"),
        }
    }

    /// The channel for a signal name, created on first use. Signals that
    /// arrived earlier are replayed into it in arrival order.
    pub(crate) fn signal_channel(&mut self, name: &str) -> Channel<Payload> {
        if let Some(channel) = self.signal_channels.get(name) {
            return channel.clone();
        }
        let channel = Channel::unbounded();
        if let Some(buffered) = self.buffered_signals.remove(name) {
            for arg in buffered {
                // Unbounded channels accept everything.
                let _ = channel.try_send(arg);
            }
        }
        self.signal_channels.insert(name.to_string(), channel.clone());
        channel
    }

    /// Route an arrived signal to its channel, or buffer it until a
    /// channel of that name is created.
    pub(crate) fn deliver_signal(&mut self, name: &str, arg: Payload) {
        match self.signal_channels.get(name) {
            Some(channel) => {
                let _ = channel.try_send(arg);
            }
            None => {
                self.buffered_signals.entry(name.to_string()).or_default().push_back(arg);
            }
        }
    }
}
