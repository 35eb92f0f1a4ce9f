//! The work queue shared between continuation producers and the driver
//! thread.
//!
//! Producers (wakers resuming from timers, channels, I/O completions on
//! arbitrary threads) only ever enqueue; the single driver thread pops and
//! executes. The condvar is the pending-work signal: the consumer blocks on
//! it while the queue is empty and every enqueue wakes it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// One queued unit of continuation work. The opaque argument of the
/// (callback, argument) pair lives in the closure capture. Consumed exactly
/// once by the drain loop.
pub(crate) struct WorkItem {
    run: Box<dyn FnOnce() + Send>,
}

impl WorkItem {
    pub(crate) fn new(run: impl FnOnce() + Send + 'static) -> Self {
        Self { run: Box::new(run) }
    }

    pub(crate) fn run(self) {
        (self.run)()
    }
}

/// Unbounded multi-producer FIFO with a blocking single-consumer pop.
pub(crate) struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    ready: Condvar,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Appends `item` and wakes the consumer. Never blocks, never fails; the
    /// queue is unbounded and back-pressure is out of scope.
    pub(crate) fn enqueue(&self, item: WorkItem) {
        let mut items = self.items.lock().expect("work queue mutex poisoned");
        items.push_back(item);
        drop(items);
        self.ready.notify_one();
    }

    /// Pops the next item in FIFO order, blocking on the pending-work signal
    /// while the queue is empty.
    pub(crate) fn pop_blocking(&self) -> WorkItem {
        let mut items = self.items.lock().expect("work queue mutex poisoned");
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self
                .ready
                .wait(items)
                .expect("work queue mutex poisoned");
        }
    }
}
