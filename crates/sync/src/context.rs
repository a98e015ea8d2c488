// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation contexts.
//!
//! Contexts form a tree; canceling a context closes its done channel and
//! cascades to all descendants within the same turn, synchronously.

use crate::channel::Channel;
use lh_core::WorkflowError;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::task::Waker;

struct ContextInner {
    canceled: Cell<bool>,
    done: Channel<()>,
    wakers: RefCell<Vec<Waker>>,
    children: RefCell<Vec<Weak<ContextInner>>>,
}

/// A cancellation scope handed to every suspension point.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// The root context of a turn. Cancelable by the executor (workflow
    /// cancellation requests land here).
    pub fn background() -> Self {
        Self {
            inner: Rc::new(ContextInner {
                canceled: Cell::new(false),
                done: Channel::unbounded(),
                wakers: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a child context plus a function canceling it.
    pub fn with_cancel(&self) -> (Context, CancelFunc) {
        let child = Context::background();
        if self.is_canceled() {
            child.cancel();
        } else {
            self.inner.children.borrow_mut().push(Rc::downgrade(&child.inner));
        }
        let cancel = CancelFunc { ctx: child.clone() };
        (child, cancel)
    }

    /// Channel closed when the context is canceled. Usable in selects.
    pub fn done(&self) -> Channel<()> {
        self.inner.done.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.get()
    }

    /// `Some(Canceled)` once canceled, `None` otherwise.
    pub fn err(&self) -> Option<WorkflowError> {
        self.is_canceled().then_some(WorkflowError::Canceled)
    }

    /// Register a callback invoked on cancellation; immediately if the
    /// context is already canceled.
    pub fn on_cancel(&self, callback: impl FnMut() + 'static) {
        self.inner.done.on_close(callback);
    }

    /// Cancel this context and every descendant.
    pub fn cancel(&self) {
        if self.inner.canceled.replace(true) {
            return;
        }
        let wakers = std::mem::take(&mut *self.inner.wakers.borrow_mut());
        for waker in wakers {
            waker.wake();
        }
        self.inner.done.close();
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children {
            if let Some(child) = child.upgrade() {
                Context { inner: child }.cancel();
            }
        }
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        if !self.is_canceled() {
            self.inner.wakers.borrow_mut().push(waker.clone());
        }
    }
}

/// Cancels the context returned alongside it. May be called repeatedly.
#[derive(Clone)]
pub struct CancelFunc {
    ctx: Context,
}

impl CancelFunc {
    pub fn cancel(&self) {
        self.ctx.cancel();
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
