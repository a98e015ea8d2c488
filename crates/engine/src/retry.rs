// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy evaluated inside workflow code.
//!
//! Every attempt issues a fresh schedule command with its own schedule
//! event id, and backoff waits are durable timers, so the whole retry
//! history replays deterministically. The engine itself never injects
//! retries.

use crate::context::WorkflowContext;
use lh_core::WorkflowError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    /// Backoff before the second attempt. Zero retries immediately,
    /// without a durable timer.
    pub first_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            first_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryOptions {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub retry: RetryOptions,
}

impl ActivityOptions {
    pub fn no_retry() -> Self {
        Self { retry: RetryOptions::none() }
    }
}

/// Drive `attempt_fn` until it succeeds, attempts are exhausted, or the
/// context cancels. Cancellation is never retried.
pub(crate) async fn with_retries<T, F>(
    ctx: &WorkflowContext,
    options: RetryOptions,
    mut attempt_fn: F,
) -> Result<T, WorkflowError>
where
    T: Clone + 'static,
    F: FnMut(&WorkflowContext, u32) -> lh_sync::Future<T>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut interval = options.first_interval;
    let mut attempt = 0;

    loop {
        let future = attempt_fn(ctx, attempt);
        match future.get(ctx).await {
            Ok(value) => return Ok(value),
            Err(WorkflowError::Canceled) => return Err(WorkflowError::Canceled),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(error);
                }
                if !interval.is_zero() {
                    ctx.timer(interval).get(ctx).await?;
                    interval = std::cmp::min(
                        interval.mul_f64(options.backoff_coefficient),
                        options.max_interval,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
