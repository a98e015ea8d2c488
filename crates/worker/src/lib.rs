// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lh-worker: Poll → lease → execute → checkpoint loops.
//!
//! A worker runs N workflow pollers and M activity pollers against one
//! backend. Pollers are independent; the backend's leases are the only
//! coordination between workers, in-process or across machines.

mod activity;
mod workflow;

use lh_backend::{Backend, BackendError};
use lh_core::{Clock, SystemClock, WorkerId};
use lh_engine::{ExecutorError, Registry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub workflow_pollers: usize,
    pub activity_pollers: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { workflow_pollers: 2, activity_pollers: 2 }
    }
}

pub struct Worker<B: Backend, C: Clock = SystemClock> {
    backend: Arc<B>,
    registry: Arc<Registry>,
    clock: C,
    id: WorkerId,
    options: WorkerOptions,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: Backend> Worker<B, SystemClock> {
    pub fn new(backend: Arc<B>, registry: Registry, options: WorkerOptions) -> Self {
        Self::with_clock(backend, registry, options, SystemClock)
    }
}

impl<B: Backend, C: Clock> Worker<B, C> {
    pub fn with_clock(
        backend: Arc<B>,
        registry: Registry,
        options: WorkerOptions,
        clock: C,
    ) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            clock,
            id: WorkerId::new(),
            options,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The sticky-queue identifier this worker publishes.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Spawn the poller tasks. Idempotence is the caller's concern.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        for _ in 0..self.options.workflow_pollers {
            handles.push(tokio::spawn(workflow::run_poller(
                Arc::clone(&self.backend),
                Arc::clone(&self.registry),
                self.clock.clone(),
                self.id,
                self.shutdown.child_token(),
            )));
        }
        for _ in 0..self.options.activity_pollers {
            handles.push(tokio::spawn(activity::run_poller(
                Arc::clone(&self.backend),
                Arc::clone(&self.registry),
                self.clock.clone(),
                self.shutdown.child_token(),
            )));
        }
        tracing::info!(
            worker = %self.id,
            workflow_pollers = self.options.workflow_pollers,
            activity_pollers = self.options.activity_pollers,
            "worker started"
        );
    }

    /// Stop polling and wait for in-flight tasks to wind down.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(worker = %self.id, "worker stopped");
    }
}

/// Exponential backoff for transient backend errors in poll loops.
pub(crate) struct PollBackoff {
    delay: Duration,
}

impl PollBackoff {
    const INITIAL: Duration = Duration::from_millis(50);
    const MAX: Duration = Duration::from_secs(5);

    pub(crate) fn new() -> Self {
        Self { delay: Self::INITIAL }
    }

    pub(crate) fn reset(&mut self) {
        self.delay = Self::INITIAL;
    }

    pub(crate) async fn wait(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.delay = std::cmp::min(self.delay * 2, Self::MAX);
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
