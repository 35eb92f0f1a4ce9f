//! Explicit ambient-context handles.
//!
//! The bridge never installs thread-global state. Whatever execution
//! context a caller is running under is represented as an explicit
//! [`ExecutionContext`] value threaded into
//! [`Session::begin`](crate::session::Session::begin) and handed onward to
//! operations. A session captures the caller's context on entry and leaves
//! it untouched on every exit path, fault or not.

use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::queue::WorkQueue;

/// Opaque handle to a session's work queue. Two handles compare equal when
/// they refer to the same underlying queue.
#[derive(Clone)]
pub struct QueueHandle {
    pub(crate) queue: Arc<WorkQueue>,
}

impl PartialEq for QueueHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }
}

impl Eq for QueueHandle {}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").finish_non_exhaustive()
    }
}

/// The ambient execution context a caller runs under.
///
/// `Detached` means no bridge is active: a new session allocates a fresh
/// queue. `Bridged` carries the queue of an active session; beginning a
/// session under it inherits that queue, so a nested blocking call drains
/// on the same driver thread instead of deadlocking against it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionContext {
    /// No bridge active on this call path.
    #[default]
    Detached,
    /// An active bridge session's queue.
    Bridged(QueueHandle),
}

impl ExecutionContext {
    pub(crate) fn bridged(queue: Arc<WorkQueue>) -> Self {
        Self::Bridged(QueueHandle { queue })
    }

    /// Whether this context carries an active bridge queue.
    pub fn is_bridged(&self) -> bool {
        matches!(self, Self::Bridged(_))
    }

    /// Synchronous dispatch into the bridge's queue.
    ///
    /// Unconditionally unsupported, from any thread: the queue has a single
    /// consumer and only asynchronous post-and-continue is modeled. The
    /// callback is dropped unrun.
    pub fn send(&self, _callback: impl FnOnce() + Send) -> Result<()> {
        Err(BridgeError::SendUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_always_a_misuse_error() {
        let detached = ExecutionContext::Detached;
        assert!(matches!(
            detached.send(|| ()),
            Err(BridgeError::SendUnsupported)
        ));

        let bridged = ExecutionContext::bridged(Arc::new(WorkQueue::new()));
        assert!(matches!(
            bridged.send(|| ()),
            Err(BridgeError::SendUnsupported)
        ));
    }

    #[test]
    fn contexts_compare_by_queue_identity() {
        let queue = Arc::new(WorkQueue::new());
        let a = ExecutionContext::bridged(Arc::clone(&queue));
        let b = ExecutionContext::bridged(queue);
        let c = ExecutionContext::bridged(Arc::new(WorkQueue::new()));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ExecutionContext::Detached);
        assert_eq!(ExecutionContext::default(), ExecutionContext::Detached);
    }
}
