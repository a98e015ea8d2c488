// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded FIFO channels for intra-turn communication.
//!
//! Capacity 0 is a rendezvous: a send completes only while a receiver is
//! parked. Closed channels drain their buffer, then receivers observe
//! `None`.

use crate::context::Context;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll, Waker};

struct Inner<T> {
    capacity: Option<usize>,
    buffer: VecDeque<T>,
    closed: bool,
    recv_wakers: VecDeque<Waker>,
    send_wakers: VecDeque<Waker>,
    /// Receivers currently parked; a rendezvous send needs one.
    recv_waiting: usize,
    close_callbacks: Vec<Box<dyn FnMut()>>,
}

impl<T> Inner<T> {
    // Wake everything and let waiters re-park: re-polls from selects
    // leave duplicate wakers behind, and waking a single entry could
    // spend the wake on a stale one.
    fn wake_receivers(&mut self) {
        for waker in self.recv_wakers.drain(..) {
            waker.wake();
        }
    }

    fn wake_senders(&mut self) {
        for waker in self.send_wakers.drain(..) {
            waker.wake();
        }
    }
}

pub struct Channel<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T> Channel<T> {
    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                capacity,
                buffer: VecDeque::new(),
                closed: false,
                recv_wakers: VecDeque::new(),
                send_wakers: VecDeque::new(),
                recv_waiting: 0,
                close_callbacks: Vec::new(),
            })),
        }
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Non-blocking receive.
    pub fn try_receive(&self) -> Option<T> {
        let mut inner = self.inner.borrow_mut();
        let value = inner.buffer.pop_front();
        if value.is_some() {
            inner.wake_senders();
        }
        value
    }

    /// Non-blocking send. Returns the value back when the channel is full
    /// or closed.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed || !can_push(&inner) {
            return Err(value);
        }
        inner.buffer.push_back(value);
        inner.wake_receivers();
        Ok(())
    }

    /// Suspend until a value arrives, the channel closes, or `ctx` cancels.
    pub fn receive<'a>(&'a self, ctx: &'a Context) -> Recv<'a, T> {
        Recv { channel: self, ctx, parked: false, done: false }
    }

    /// Suspend until the value is accepted. Returns false when the channel
    /// closed or `ctx` canceled before the value was taken.
    pub fn send<'a>(&'a self, ctx: &'a Context, value: T) -> Send<'a, T> {
        Send { channel: self, ctx, value: Some(value) }
    }

    /// Close the channel. Parked senders and receivers wake; close
    /// callbacks run once, in registration order.
    pub fn close(&self) {
        let (wakers, mut callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let mut wakers: Vec<Waker> = inner.recv_wakers.drain(..).collect();
            wakers.extend(inner.send_wakers.drain(..));
            (wakers, std::mem::take(&mut inner.close_callbacks))
        };
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks.iter_mut() {
            callback();
        }
    }

    /// Register a callback to run when the channel closes. Runs
    /// immediately if the channel is already closed.
    pub fn on_close(&self, mut callback: impl FnMut() + 'static) {
        let closed = self.inner.borrow().closed;
        if closed {
            callback();
        } else {
            self.inner.borrow_mut().close_callbacks.push(Box::new(callback));
        }
    }
}

fn can_push<T>(inner: &Inner<T>) -> bool {
    match inner.capacity {
        None => true,
        Some(0) => inner.recv_waiting > 0,
        Some(cap) => inner.buffer.len() < cap,
    }
}

/// Suspension returned by [`Channel::receive`].
pub struct Recv<'a, T> {
    channel: &'a Channel<T>,
    ctx: &'a Context,
    parked: bool,
    done: bool,
}

impl<T> std::future::Future for Recv<'_, T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut inner = self.channel.inner.borrow_mut();
        if let Some(value) = inner.buffer.pop_front() {
            inner.wake_senders();
            drop(inner);
            self.finish();
            return Poll::Ready(Some(value));
        }
        if inner.closed {
            drop(inner);
            self.finish();
            return Poll::Ready(None);
        }
        if self.ctx.is_canceled() {
            drop(inner);
            self.finish();
            return Poll::Ready(None);
        }
        if !self.parked {
            self.parked = true;
            inner.recv_waiting += 1;
        }
        inner.recv_wakers.push_back(task_cx.waker().clone());
        // A rendezvous sender may be able to proceed now.
        inner.wake_senders();
        drop(inner);
        self.ctx.register_waker(task_cx.waker());
        Poll::Pending
    }
}

impl<T> Recv<'_, T> {
    fn finish(&mut self) {
        if self.parked {
            self.parked = false;
            self.channel.inner.borrow_mut().recv_waiting -= 1;
        }
        self.done = true;
    }
}

impl<T> Drop for Recv<'_, T> {
    fn drop(&mut self) {
        if self.parked && !self.done {
            self.channel.inner.borrow_mut().recv_waiting -= 1;
        }
    }
}

/// Suspension returned by [`Channel::send`].
pub struct Send<'a, T> {
    channel: &'a Channel<T>,
    ctx: &'a Context,
    value: Option<T>,
}

// The pending value is moved out on completion; nothing here relies on
// address stability.
impl<T> Unpin for Send<'_, T> {}

impl<T> std::future::Future for Send<'_, T> {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut inner = self.channel.inner.borrow_mut();
        if inner.closed {
            return Poll::Ready(false);
        }
        if self.ctx.is_canceled() {
            return Poll::Ready(false);
        }
        if can_push(&inner) {
            if let Some(value) = self.value.take() {
                inner.buffer.push_back(value);
            }
            inner.wake_receivers();
            return Poll::Ready(true);
        }
        inner.send_wakers.push_back(task_cx.waker().clone());
        drop(inner);
        self.ctx.register_waker(task_cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
