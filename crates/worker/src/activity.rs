// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity task handling: run the registered function and report the
//! result event back to the originating instance.

use crate::{PollBackoff, WorkerError};
use lh_backend::{Backend, BackendError};
use lh_core::{ActivityContext, ActivityTask, Clock, Event, EventKind, WorkflowError};
use lh_engine::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) async fn run_poller<B: Backend, C: Clock>(
    backend: Arc<B>,
    registry: Arc<Registry>,
    clock: C,
    shutdown: CancellationToken,
) {
    let mut backoff = PollBackoff::new();
    loop {
        let task = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = backend.get_activity_task() => match result {
                Ok(Some(task)) => {
                    backoff.reset();
                    task
                }
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(error = %error, "activity task poll failed; backing off");
                    backoff.wait().await;
                    continue;
                }
            },
        };

        if let Err(error) = handle_task(&backend, &registry, &clock, task).await {
            tracing::error!(error = %error, "activity task failed");
        }
    }
}

async fn handle_task<B: Backend, C: Clock>(
    backend: &Arc<B>,
    registry: &Registry,
    clock: &C,
    task: ActivityTask,
) -> Result<(), WorkerError> {
    let EventKind::ActivityScheduled { name, inputs } = &task.event.kind else {
        tracing::error!(
            activity_id = %task.id,
            event = task.event.type_name(),
            "activity task carries a non-activity event; dropping"
        );
        return Ok(());
    };
    tracing::debug!(
        activity_id = %task.id,
        activity = %name,
        attempt = task.attempt,
        instance_id = %task.instance.instance_id,
        "executing activity"
    );

    let heartbeat_stop = CancellationToken::new();
    let heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(backend),
        task.id,
        heartbeat_stop.clone(),
    ));

    let outcome = match registry.activity(name) {
        Some(function) => {
            let ctx = ActivityContext { instance: task.instance.clone(), attempt: task.attempt };
            function(ctx, inputs.clone()).await
        }
        None => Err(WorkflowError::failure(format!("activity not registered: {name}"))),
    };

    heartbeat_stop.cancel();
    let _ = heartbeat.await;

    let kind = match outcome {
        Ok(result) => EventKind::ActivityCompleted { result },
        Err(error) => EventKind::ActivityFailed { error },
    };
    let result_event = Event::with_schedule_id(clock.epoch_ms(), task.event.schedule_event_id, kind);

    match backend.complete_activity_task(&task.instance, &task.id, result_event).await {
        Ok(()) => Ok(()),
        Err(BackendError::ActivityNotFound(_)) => {
            // Lease expired and another worker finished it; at-least-once
            // execution makes this benign.
            tracing::warn!(activity_id = %task.id, "activity completed elsewhere; dropping result");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn run_heartbeat<B: Backend>(backend: Arc<B>, activity_id: Uuid, stop: CancellationToken) {
    let period = backend.options().activity_lock_timeout / 2;
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(period) => {
                if let Err(error) = backend.extend_activity_task(&activity_id).await {
                    tracing::warn!(activity_id = %activity_id, error = %error, "activity heartbeat failed");
                    return;
                }
            }
        }
    }
}
