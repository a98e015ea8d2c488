// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lh-client: Creating, signaling, canceling, and observing workflow
//! instances from outside the engine.

use lh_backend::{Backend, BackendError};
use lh_core::{
    from_payload, Clock, Event, EventKind, InstanceId, InstanceState, Metadata, Payload,
    PayloadError, SystemClock, WorkflowError, WorkflowInstance,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("workflow did not finish within the timeout")]
    Timeout,

    #[error("workflow canceled")]
    WorkflowCanceled,

    #[error("workflow terminated")]
    WorkflowTerminated,

    #[error("workflow failed: {0}")]
    WorkflowFailed(WorkflowError),

    #[error("workflow finished, but no result event was recorded")]
    MissingResult,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowInstanceOptions {
    /// Caller-chosen instance id; random when unset.
    pub instance_id: Option<InstanceId>,
    pub metadata: Metadata,
}

pub struct Client<B: Backend, C: Clock = SystemClock> {
    backend: Arc<B>,
    clock: C,
}

impl<B: Backend> Client<B, SystemClock> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_clock(backend, SystemClock)
    }
}

impl<B: Backend, C: Clock> Client<B, C> {
    pub fn with_clock(backend: Arc<B>, clock: C) -> Self {
        Self { backend, clock }
    }

    /// Start a new workflow instance.
    pub async fn create_workflow_instance(
        &self,
        options: WorkflowInstanceOptions,
        workflow_name: &str,
        inputs: Vec<Payload>,
    ) -> Result<WorkflowInstance, ClientError> {
        let instance_id = options.instance_id.unwrap_or_default();
        let instance = WorkflowInstance::new(instance_id);
        let started = Event::new(
            self.clock.epoch_ms(),
            EventKind::WorkflowExecutionStarted {
                name: workflow_name.to_string(),
                inputs,
                metadata: options.metadata.clone(),
            },
        );
        self.backend
            .create_workflow_instance(instance.clone(), options.metadata, started)
            .await?;
        tracing::debug!(
            instance_id = %instance.instance_id,
            execution_id = %instance.execution_id,
            workflow = workflow_name,
            "created workflow instance"
        );
        Ok(instance)
    }

    /// Deliver a named signal to a running instance.
    pub async fn signal_workflow(
        &self,
        instance_id: InstanceId,
        name: &str,
        arg: Payload,
    ) -> Result<(), ClientError> {
        let event = Event::new(
            self.clock.epoch_ms(),
            EventKind::SignalReceived { name: name.to_string(), arg },
        );
        self.backend.signal_workflow_instance(&instance_id, event).await?;
        tracing::debug!(instance_id = %instance_id, signal = name, "signaled workflow instance");
        Ok(())
    }

    /// Request cancellation of a running instance.
    pub async fn cancel_workflow_instance(
        &self,
        instance_id: InstanceId,
    ) -> Result<(), ClientError> {
        let event =
            Event::new(self.clock.epoch_ms(), EventKind::WorkflowExecutionCanceled {});
        self.backend.cancel_workflow_instance(&instance_id, event).await?;
        tracing::debug!(instance_id = %instance_id, "requested workflow cancellation");
        Ok(())
    }

    /// Poll until the instance reaches `Finished` or the timeout passes.
    pub async fn wait_for_workflow_instance(
        &self,
        instance: &WorkflowInstance,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut interval = Duration::from_millis(1);
        loop {
            let state =
                self.backend.get_workflow_instance_state(&instance.instance_id).await?;
            if state == InstanceState::Finished {
                return Ok(());
            }
            if tokio::time::Instant::now() + interval >= deadline {
                return Err(ClientError::Timeout);
            }
            tokio::time::sleep(interval).await;
            interval = std::cmp::min(interval.mul_f64(1.5), Duration::from_secs(1));
        }
    }

    /// Wait for completion, then read the terminal event out of history.
    pub async fn get_workflow_result<T: DeserializeOwned>(
        &self,
        instance: &WorkflowInstance,
        timeout: Duration,
    ) -> Result<T, ClientError> {
        self.wait_for_workflow_instance(instance, timeout).await?;

        let history =
            self.backend.get_workflow_instance_history(&instance.instance_id, 0).await?;
        for event in history.iter().rev() {
            match &event.kind {
                EventKind::WorkflowExecutionFinished { result, error } => {
                    return match error {
                        Some(WorkflowError::Canceled) => Err(ClientError::WorkflowCanceled),
                        Some(error) => Err(ClientError::WorkflowFailed(error.clone())),
                        None => {
                            let payload = result.clone().unwrap_or_else(Payload::null);
                            Ok(from_payload(&payload)?)
                        }
                    };
                }
                EventKind::WorkflowExecutionCanceled {} => {
                    return Err(ClientError::WorkflowCanceled);
                }
                EventKind::WorkflowExecutionTerminated { .. } => {
                    return Err(ClientError::WorkflowTerminated);
                }
                _ => {}
            }
        }
        Err(ClientError::MissingResult)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
