// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow and activity registration.
//!
//! Typed functions register by name; adapters decode positional payload
//! inputs and encode the result, so workflow code never touches payloads
//! directly.

use crate::context::WorkflowContext;
use futures_util::future::{BoxFuture, LocalBoxFuture};
use lh_core::{from_payload, to_payload, ActivityContext, Payload, WorkflowError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered workflow body. The returned future is `!Send`: it runs on
/// the turn's single-threaded scheduler.
pub type WorkflowFunction = Arc<
    dyn Fn(WorkflowContext, Vec<Payload>) -> LocalBoxFuture<'static, Result<Option<Payload>, WorkflowError>>
        + Send
        + Sync,
>;

/// A registered activity body. Runs on the async runtime, off the
/// workflow thread.
pub type ActivityFunction = Arc<
    dyn Fn(ActivityContext, Vec<Payload>) -> BoxFuture<'static, Result<Payload, WorkflowError>>
        + Send
        + Sync,
>;

#[derive(Default)]
pub struct Registry {
    workflows: HashMap<String, WorkflowFunction>,
    activities: HashMap<String, ActivityFunction>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workflow<Args>(&mut self, name: &str, workflow: impl IntoWorkflow<Args>) {
        self.workflows.insert(name.to_string(), workflow.into_workflow());
    }

    pub fn add_activity<Args>(&mut self, name: &str, activity: impl IntoActivity<Args>) {
        self.activities.insert(name.to_string(), activity.into_activity());
    }

    pub fn workflow(&self, name: &str) -> Option<WorkflowFunction> {
        self.workflows.get(name).cloned()
    }

    pub fn activity(&self, name: &str) -> Option<ActivityFunction> {
        self.activities.get(name).cloned()
    }
}

fn encode_result<R: Serialize>(
    result: Result<R, WorkflowError>,
) -> Result<Option<Payload>, WorkflowError> {
    Ok(Some(to_payload(&result?)?))
}

fn decode_input<A: DeserializeOwned>(
    inputs: &[Payload],
    index: usize,
) -> Result<A, WorkflowError> {
    let payload = inputs
        .get(index)
        .ok_or_else(|| WorkflowError::failure(format!("missing input {index}")))?;
    Ok(from_payload(payload)?)
}

/// Adapter from a typed async function to a [`WorkflowFunction`].
pub trait IntoWorkflow<Args>: Send + Sync + 'static {
    fn into_workflow(self) -> WorkflowFunction;
}

impl<F, Fut, R> IntoWorkflow<()> for F
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + 'static,
    R: Serialize + 'static,
{
    fn into_workflow(self) -> WorkflowFunction {
        Arc::new(move |ctx, _inputs| {
            let body = self(ctx);
            Box::pin(async move { encode_result(body.await) })
        })
    }
}

impl<F, Fut, A, R> IntoWorkflow<(A,)> for F
where
    F: Fn(WorkflowContext, A) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + 'static,
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    fn into_workflow(self) -> WorkflowFunction {
        Arc::new(move |ctx, inputs| match decode_input::<A>(&inputs, 0) {
            Ok(a) => {
                let body = self(ctx, a);
                Box::pin(async move { encode_result(body.await) })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        })
    }
}

impl<F, Fut, A, B, R> IntoWorkflow<(A, B)> for F
where
    F: Fn(WorkflowContext, A, B) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + 'static,
    A: DeserializeOwned + 'static,
    B: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    fn into_workflow(self) -> WorkflowFunction {
        Arc::new(move |ctx, inputs| {
            let decoded =
                decode_input::<A>(&inputs, 0).and_then(|a| Ok((a, decode_input::<B>(&inputs, 1)?)));
            match decoded {
                Ok((a, b)) => {
                    let body = self(ctx, a, b);
                    Box::pin(async move { encode_result(body.await) })
                }
                Err(e) => Box::pin(async move { Err(e) }),
            }
        })
    }
}

/// Adapter from a typed async function to an [`ActivityFunction`].
pub trait IntoActivity<Args>: Send + Sync + 'static {
    fn into_activity(self) -> ActivityFunction;
}

impl<F, Fut, R> IntoActivity<()> for F
where
    F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + Send + 'static,
    R: Serialize + 'static,
{
    fn into_activity(self) -> ActivityFunction {
        Arc::new(move |ctx, _inputs| {
            let body = self(ctx);
            Box::pin(async move { to_payload(&body.await?).map_err(Into::into) })
        })
    }
}

impl<F, Fut, A, R> IntoActivity<(A,)> for F
where
    F: Fn(ActivityContext, A) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + Send + 'static,
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    fn into_activity(self) -> ActivityFunction {
        Arc::new(move |ctx, inputs| match decode_input::<A>(&inputs, 0) {
            Ok(a) => {
                let body = self(ctx, a);
                Box::pin(async move { to_payload(&body.await?).map_err(Into::into) })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        })
    }
}

impl<F, Fut, A, B, R> IntoActivity<(A, B)> for F
where
    F: Fn(ActivityContext, A, B) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<R, WorkflowError>> + Send + 'static,
    A: DeserializeOwned + 'static,
    B: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    fn into_activity(self) -> ActivityFunction {
        Arc::new(move |ctx, inputs| {
            let decoded =
                decode_input::<A>(&inputs, 0).and_then(|a| Ok((a, decode_input::<B>(&inputs, 1)?)));
            match decoded {
                Ok((a, b)) => {
                    let body = self(ctx, a, b);
                    Box::pin(async move { to_payload(&body.await?).map_err(Into::into) })
                }
                Err(e) => Box::pin(async move { Err(e) }),
            }
        })
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
