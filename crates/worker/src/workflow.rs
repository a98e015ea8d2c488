// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow task handling: execute a leased turn under a heartbeat and
//! checkpoint the result.

use crate::{PollBackoff, WorkerError};
use lh_backend::{Backend, BackendError};
use lh_core::{Clock, TaskId, WorkerId, WorkflowTask};
use lh_engine::{ExecutorError, Registry, WorkflowExecutor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run_poller<B: Backend, C: Clock>(
    backend: Arc<B>,
    registry: Arc<Registry>,
    clock: C,
    worker_id: WorkerId,
    shutdown: CancellationToken,
) {
    let mut backoff = PollBackoff::new();
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = backend.get_workflow_task(&worker_id) => match result {
                Ok(Some(task)) => {
                    backoff.reset();
                    task
                }
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(error = %error, "workflow task poll failed; backing off");
                    backoff.wait().await;
                    continue;
                }
            },
        };

        if let Err(error) = handle_task(&backend, &registry, &clock, task).await {
            tracing::error!(error = %error, "workflow task failed");
        }
    }
}

async fn handle_task<B: Backend, C: Clock>(
    backend: &Arc<B>,
    registry: &Registry,
    clock: &C,
    task: WorkflowTask,
) -> Result<(), WorkerError> {
    let instance_id = task.instance.instance_id;
    tracing::debug!(
        instance_id = %instance_id,
        task_id = %task.id,
        history = task.history.len(),
        new_events = task.new_events.len(),
        "executing workflow task"
    );

    let lease_lost = Arc::new(AtomicBool::new(false));
    let heartbeat_stop = CancellationToken::new();
    let heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(backend),
        task.id,
        Arc::clone(&lease_lost),
        heartbeat_stop.clone(),
    ));

    let result = WorkflowExecutor::new(registry).execute(&task, clock.epoch_ms());

    heartbeat_stop.cancel();
    let _ = heartbeat.await;

    let output = match result {
        Ok(output) => output,
        Err(error @ ExecutorError::NonDeterminism { .. }) => {
            // Fatal for the instance: the lease is returned uncommitted
            // and the next attempt will hit the same mismatch.
            tracing::error!(
                instance_id = %instance_id,
                error = %error,
                "non-deterministic workflow execution; abandoning task"
            );
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    if lease_lost.load(Ordering::SeqCst) {
        tracing::warn!(instance_id = %instance_id, "lease lost during execution; discarding turn");
        return Ok(());
    }

    match backend
        .complete_workflow_task(
            &task,
            output.state,
            output.executed_events,
            output.activity_events,
            output.timer_events,
            output.workflow_events,
        )
        .await
    {
        Ok(()) => Ok(()),
        Err(BackendError::LeaseLost(_)) => {
            tracing::warn!(instance_id = %instance_id, "lease lost at checkpoint; turn discarded");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Push the lease forward while the turn runs. A failed extension flags
/// the turn so its commit is aborted.
async fn run_heartbeat<B: Backend>(
    backend: Arc<B>,
    task_id: TaskId,
    lease_lost: Arc<AtomicBool>,
    stop: CancellationToken,
) {
    let period = backend.options().sticky_timeout / 2;
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(period) => {
                if let Err(error) = backend.extend_workflow_task(&task_id).await {
                    tracing::warn!(task_id = %task_id, error = %error, "heartbeat failed");
                    lease_lost.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}
