//! Submitted operations as queue-driven tasks.
//!
//! A submitted future lives inside an [`Task`] and is only ever polled by
//! the driver thread, as a work item dequeued from the session queue. The
//! task's waker re-posts a poll item onto that same queue, which is how
//! continuations resumed on arbitrary threads are marshaled back to the
//! driver.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::task::{Context, Poll};

use futures::task::ArcWake;

use crate::queue::{WorkItem, WorkQueue};

pub(crate) type BoxedOperation = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub(crate) struct Task {
    /// Empty once the future has run to completion.
    future: Mutex<Option<BoxedOperation>>,
    queue: Arc<WorkQueue>,
    /// Set when a wake for this task is dequeued while the task is mid-poll
    /// further up the same thread's stack (a nested drain on a shared
    /// queue). The active poll picks it up instead of deadlocking on the
    /// future mutex.
    repoll: AtomicBool,
}

impl Task {
    /// Boxes `future` into a task and posts its first poll onto `queue`.
    pub(crate) fn spawn(future: BoxedOperation, queue: Arc<WorkQueue>) {
        let task = Arc::new(Task {
            future: Mutex::new(Some(future)),
            queue,
            repoll: AtomicBool::new(false),
        });
        Task::schedule(&task);
    }

    fn schedule(this: &Arc<Task>) {
        let task = Arc::clone(this);
        this.queue.enqueue(WorkItem::new(move || Task::poll(&task)));
    }

    fn poll(this: &Arc<Task>) {
        let mut slot = match this.future.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => {
                this.repoll.store(true, Ordering::SeqCst);
                return;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let waker = futures::task::waker(Arc::clone(this));
        let mut cx = Context::from_waker(&waker);
        while let Some(mut future) = slot.take() {
            match future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => return,
                Poll::Pending => {
                    *slot = Some(future);
                    if !this.repoll.swap(false, Ordering::SeqCst) {
                        return;
                    }
                }
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        Task::schedule(arc_self);
    }
}

/// Output slot for a value-producing operation. The session writes the
/// produced value into the slot once the operation completes; the caller
/// takes it out after the session has drained.
pub struct ValueSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> ValueSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn put(&self, value: T) {
        *self.value.lock().expect("value slot mutex poisoned") = Some(value);
    }

    /// Takes the produced value, leaving the slot empty. `None` when the
    /// operation has not completed or did not produce a value.
    pub fn take(&self) -> Option<T> {
        self.value.lock().expect("value slot mutex poisoned").take()
    }
}

impl<T> Clone for ValueSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> std::fmt::Debug for ValueSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueSlot").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_future_completes_in_one_item() {
        let queue = Arc::new(WorkQueue::new());
        let slot = ValueSlot::new();
        let output = slot.clone();

        Task::spawn(
            Box::pin(async move { output.put(7) }),
            Arc::clone(&queue),
        );
        queue.pop_blocking().run();

        assert_eq!(slot.take(), Some(7));
    }

    #[test]
    fn cross_thread_wake_reposts_a_poll() {
        let queue = Arc::new(WorkQueue::new());
        let (tx, rx) = futures::channel::oneshot::channel::<u32>();
        let slot = ValueSlot::new();
        let output = slot.clone();

        Task::spawn(
            Box::pin(async move {
                if let Ok(value) = rx.await {
                    output.put(value);
                }
            }),
            Arc::clone(&queue),
        );

        // First poll parks the task on the oneshot.
        queue.pop_blocking().run();
        assert_eq!(slot.take(), None);

        let sender = std::thread::spawn(move || {
            tx.send(9).unwrap();
        });
        // The wake from the sender thread lands as a fresh poll item.
        queue.pop_blocking().run();
        sender.join().unwrap();

        assert_eq!(slot.take(), Some(9));
    }
}
