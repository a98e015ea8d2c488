// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic two-way select.
//!
//! Cases are polled in declared order on every wake; when both are ready
//! at the same suspension point, the left case wins. Compose nested
//! selects for more cases.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    Left(A),
    Right(B),
}

pub fn select<'a, A: 'a, B: 'a>(
    left: impl Future<Output = A> + 'a,
    right: impl Future<Output = B> + 'a,
) -> impl Future<Output = Either<A, B>> + 'a {
    let mut left: Pin<Box<dyn Future<Output = A> + 'a>> = Box::pin(left);
    let mut right: Pin<Box<dyn Future<Output = B> + 'a>> = Box::pin(right);
    std::future::poll_fn(move |task_cx| {
        if let Poll::Ready(value) = left.as_mut().poll(task_cx) {
            return Poll::Ready(Either::Left(value));
        }
        if let Poll::Ready(value) = right.as_mut().poll(task_cx) {
            return Poll::Ready(Either::Right(value));
        }
        Poll::Pending
    })
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
