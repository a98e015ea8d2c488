// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-assignment futures observable from workflow code.

use crate::context::Context;
use lh_core::WorkflowError;
use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll, Waker};
use thiserror::Error;

/// Returned when `set` is called on an already-resolved future.
/// Resolving twice is a programming bug in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("future already resolved")]
pub struct SetError;

enum State<T> {
    Pending,
    Ready(Result<T, WorkflowError>),
}

struct Inner<T> {
    state: State<T>,
    wakers: Vec<Waker>,
}

/// A future that is resolved exactly once, by the executor or by workflow
/// code, and observed by awaiting [`Future::get`].
pub struct Future<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Future<T> {
    pub fn new() -> Self {
        Self { inner: Rc::new(RefCell::new(Inner { state: State::Pending, wakers: Vec::new() })) }
    }

    /// Whether the future has been resolved.
    pub fn ready(&self) -> bool {
        matches!(self.inner.borrow().state, State::Ready(_))
    }

    /// Resolve the future. Errors if already resolved.
    pub fn set(&self, result: Result<T, WorkflowError>) -> Result<(), SetError> {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.state, State::Ready(_)) {
            return Err(SetError);
        }
        inner.state = State::Ready(result);
        let wakers = std::mem::take(&mut inner.wakers);
        drop(inner);
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    fn register(&self, waker: &Waker) {
        self.inner.borrow_mut().wakers.push(waker.clone());
    }
}

impl<T: Clone> Future<T> {
    /// The resolved value, if any.
    pub fn peek(&self) -> Option<Result<T, WorkflowError>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Ready(result) => Some(result.clone()),
        }
    }

    /// Suspend until the future resolves or `ctx` is canceled.
    ///
    /// A resolved value wins over cancellation when both are observable at
    /// the same suspension point.
    pub fn get<'a>(&'a self, ctx: &'a Context) -> Get<'a, T> {
        Get { future: self, ctx }
    }
}

/// Suspension returned by [`Future::get`].
pub struct Get<'a, T> {
    future: &'a Future<T>,
    ctx: &'a Context,
}

impl<T: Clone> std::future::Future for Get<'_, T> {
    type Output = Result<T, WorkflowError>;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.future.peek() {
            return Poll::Ready(result);
        }
        if self.ctx.is_canceled() {
            return Poll::Ready(Err(WorkflowError::Canceled));
        }
        self.future.register(task_cx.waker());
        self.ctx.register_waker(task_cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
#[path = "future_tests.rs"]
mod tests;
