// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative coroutine run loop.
//!
//! Coroutines are plain Rust futures polled by hand. Each carries a wake
//! flag; a poll happens only when the flag is set, and suspension means
//! returning `Pending` with the flag clear. `execute` drains wake flags in
//! coroutine insertion order until nothing is runnable.

use futures_util::task::{waker, ArcWake};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Waker};

type CoroutineFuture = Pin<Box<dyn Future<Output = ()>>>;

struct WakeFlag {
    woken: AtomicBool,
}

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::SeqCst);
    }
}

struct Coroutine {
    future: Option<CoroutineFuture>,
    flag: Arc<WakeFlag>,
    waker: Waker,
}

/// Single-threaded cooperative scheduler for one workflow turn.
#[derive(Default)]
pub struct Scheduler {
    coroutines: Vec<Coroutine>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { coroutines: Vec::new() }
    }

    /// Add a coroutine to the runnable set. It will first run on the next
    /// `execute`.
    pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) {
        let flag = Arc::new(WakeFlag { woken: AtomicBool::new(true) });
        let coroutine_waker = waker(Arc::clone(&flag));
        self.coroutines.push(Coroutine {
            future: Some(Box::pin(future)),
            flag,
            waker: coroutine_waker,
        });
    }

    /// Run every runnable coroutine to its next suspension point.
    ///
    /// Returns when all coroutines are suspended or finished. The caller
    /// owns the thread for the duration.
    pub fn execute(&mut self) {
        loop {
            let mut progressed = false;
            for coroutine in self.coroutines.iter_mut() {
                let Some(future) = coroutine.future.as_mut() else {
                    continue;
                };
                if !coroutine.flag.woken.swap(false, Ordering::SeqCst) {
                    continue;
                }
                progressed = true;
                let mut task_cx = TaskContext::from_waker(&coroutine.waker);
                if future.as_mut().poll(&mut task_cx).is_ready() {
                    coroutine.future = None;
                }
            }
            if !progressed {
                break;
            }
        }
        self.coroutines.retain(|c| c.future.is_some());
    }

    /// Number of coroutines that have not finished.
    pub fn running(&self) -> usize {
        self.coroutines.len()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
