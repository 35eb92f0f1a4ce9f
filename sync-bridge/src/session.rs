//! Bridge sessions: submission tracking, the drain loop, and teardown.
//!
//! A [`Session`] is one synchronous-execution window. It owns (or inherits,
//! when nested under an active bridge) a work queue, counts live
//! operations, and captures the first fault any of them raises. Finishing
//! the session blocks the calling thread on the drain loop until every
//! submitted operation and every continuation it spawned has run, which is
//! detected by a sentinel item posted when the live counter reaches zero.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};
use crate::queue::{WorkItem, WorkQueue};
use crate::task::{Task, ValueSlot};

/// Set-once cell for the first fault of a session. The first writer wins;
/// later faults are logged and suppressed. The atomic flag lets the drain
/// loop check for a recorded fault without taking the lock.
struct FaultCell {
    raised: AtomicBool,
    slot: Mutex<Option<anyhow::Error>>,
}

impl FaultCell {
    fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    fn record(&self, fault: anyhow::Error) {
        let mut slot = self.slot.lock().expect("fault cell mutex poisoned");
        if slot.is_none() {
            *slot = Some(fault);
            self.raised.store(true, Ordering::SeqCst);
        } else {
            debug!(%fault, "suppressing fault raised after the first");
        }
    }

    fn raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<anyhow::Error> {
        self.slot.lock().expect("fault cell mutex poisoned").take()
    }
}

/// Shared state of one session, reachable from the owner, cloned handles,
/// and the completion items posted back onto the queue.
pub(crate) struct SessionState {
    queue: Arc<WorkQueue>,
    live: AtomicUsize,
    fault: FaultCell,
    done: AtomicBool,
    sentinel_posted: AtomicBool,
}

impl SessionState {
    fn new(queue: Arc<WorkQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            live: AtomicUsize::new(0),
            fault: FaultCell::new(),
            done: AtomicBool::new(false),
            sentinel_posted: AtomicBool::new(false),
        })
    }

    /// Posts the end-of-session item. At most once per session; the item
    /// sets the done flag the drain loop checks each iteration.
    fn post_sentinel(this: &Arc<Self>) {
        if this.sentinel_posted.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = Arc::clone(this);
        this.queue
            .enqueue(WorkItem::new(move || state.done.store(true, Ordering::SeqCst)));
    }

    /// Completion bookkeeping, run as a queued work item. Decrementing the
    /// counter to zero posts the sentinel.
    fn operation_finished(this: &Arc<Self>) {
        if this.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            Self::post_sentinel(this);
        }
    }

    /// The drain loop. Runs queued items on the calling thread until the
    /// sentinel has set the done flag, blocking while the queue is empty.
    /// Stops at the first recorded fault; anything already queued past the
    /// fault is left behind. Returning the error instead of unwinding keeps
    /// the loop's exit a value the caller matches on.
    fn drain(&self) -> Result<()> {
        loop {
            if self.fault.raised() {
                let cause = self.fault.take().unwrap_or_else(|| {
                    anyhow::anyhow!("fault flag raised without a recorded cause")
                });
                return Err(BridgeError::TaskFailed(cause));
            }
            if self.done.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.queue.pop_blocking().run();
        }
    }
}

/// Cloneable handle for submitting work into a running session. Operations
/// receive one so they can submit further work into the same session or
/// open a nested session on the same queue.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<SessionState>,
}

impl SessionHandle {
    /// Schedules `op` into the session, value-producing variant. The live
    /// counter is incremented before scheduling; completion is posted back
    /// onto the session queue as its own work item, which writes the
    /// produced value into the returned slot (or the fault into the fault
    /// cell) and decrements the counter.
    pub fn submit_with<T, F>(&self, op: F) -> ValueSlot<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let live = state.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(live, "operation submitted");

        let slot = ValueSlot::new();
        let output = slot.clone();
        let queue = Arc::clone(&state.queue);
        let wrapped = async move {
            let result = op.await;
            let completion_queue = Arc::clone(&state.queue);
            completion_queue.enqueue(WorkItem::new(move || {
                match result {
                    Ok(value) => output.put(value),
                    Err(fault) => state.fault.record(fault),
                }
                SessionState::operation_finished(&state);
            }));
        };
        Task::spawn(Box::pin(wrapped), queue);
        slot
    }

    /// Schedules `op` into the session, no produced value.
    pub fn submit<F>(&self, op: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let _ = self.submit_with(op);
    }

    /// The session's own context, for nesting further blocking calls.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::bridged(Arc::clone(&self.state.queue))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("live", &self.state.live.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// One synchronous-execution session.
///
/// Begin it under the caller's ambient context, submit one or more
/// asynchronous operations, then [`finish`](Session::finish) to block until
/// everything has drained. The ambient context captured at begin is never
/// mutated; restoration on exit is structural.
pub struct Session {
    state: Arc<SessionState>,
    ambient: ExecutionContext,
    finished: bool,
}

impl Session {
    /// Captures `ambient` and opens a session. A `Bridged` ambient context
    /// means an outer session is already draining on this call path: its
    /// queue is inherited so nested work serializes on the same driver
    /// thread. Never fails.
    pub fn begin(ambient: &ExecutionContext) -> Self {
        let queue = match ambient {
            ExecutionContext::Bridged(handle) => {
                debug!("session inheriting queue from active bridge");
                Arc::clone(&handle.queue)
            }
            ExecutionContext::Detached => {
                debug!("session starting with a fresh queue");
                Arc::new(WorkQueue::new())
            }
        };
        Self {
            state: SessionState::new(queue),
            ambient: ambient.clone(),
            finished: false,
        }
    }

    /// A cloneable submission handle for this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// The session's own context, as handed to its operations.
    pub fn context(&self) -> ExecutionContext {
        self.handle().context()
    }

    /// The ambient context captured at [`begin`](Session::begin).
    pub fn ambient(&self) -> &ExecutionContext {
        &self.ambient
    }

    /// See [`SessionHandle::submit`].
    pub fn submit<F>(&self, op: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handle().submit(op)
    }

    /// See [`SessionHandle::submit_with`].
    pub fn submit_with<T, F>(&self, op: F) -> ValueSlot<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.handle().submit_with(op)
    }

    /// Blocks the calling thread until all submitted operations and their
    /// continuations have drained, then surfaces the first recorded fault
    /// if there was one. A session that submitted nothing posts its
    /// sentinel here so the drain still has an exit.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        if self.state.live.load(Ordering::SeqCst) == 0 {
            SessionState::post_sentinel(&self.state);
        }
        let result = self.state.drain();
        match &result {
            Ok(()) => debug!("session drained"),
            Err(error) => warn!(%error, "session ended with a fault"),
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Draining here could block inside an unwind, so queued work is
        // abandoned instead.
        if !self.finished {
            warn!("session dropped without finish; abandoning queued work");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("live", &self.state.live.load(Ordering::SeqCst))
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_cell_keeps_the_first_fault() {
        let cell = FaultCell::new();
        assert!(!cell.raised());

        cell.record(anyhow::anyhow!("first"));
        cell.record(anyhow::anyhow!("second"));

        assert!(cell.raised());
        assert_eq!(cell.take().unwrap().to_string(), "first");
        assert!(cell.take().is_none());
    }

    #[test]
    fn sentinel_posts_at_most_once() {
        let state = SessionState::new(Arc::new(WorkQueue::new()));
        SessionState::post_sentinel(&state);
        SessionState::post_sentinel(&state);

        // One queued item; running it sets done.
        state.queue.pop_blocking().run();
        assert!(state.done.load(Ordering::SeqCst));

        // A second pop would block forever if another sentinel were queued,
        // so check emptiness through the drain instead.
        assert!(state.drain().is_ok());
    }

    #[test]
    fn zero_submission_session_finishes() {
        let session = Session::begin(&ExecutionContext::Detached);
        assert!(session.finish().is_ok());
    }

    #[test]
    fn dropping_an_unfinished_session_does_not_block() {
        let session = Session::begin(&ExecutionContext::Detached);
        session.submit(async { Ok(()) });
        drop(session);
    }
}
