//! Blocking entry points over [`Session`], plus detached execution.

use std::future::Future;

use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};
use crate::session::{Session, SessionHandle};

/// Handler invoked with the fault of a detached operation.
pub type ErrorHandler = Box<dyn FnOnce(anyhow::Error) + Send>;

/// Blocks the calling thread until `op` completes.
///
/// `op` receives the session's [`SessionHandle`] so it can submit further
/// work into the same session or open a nested blocking call via
/// [`SessionHandle::context`]. The first fault raised by the operation or
/// anything it submitted is re-surfaced as [`BridgeError::TaskFailed`].
///
/// # Examples
///
/// ```rust
/// use sync_bridge::{run_sync, ExecutionContext};
///
/// run_sync(&ExecutionContext::Detached, |_session| async {
///     // asynchronous work, driven to completion on this thread
///     Ok(())
/// })
/// .unwrap();
/// ```
pub fn run_sync<F, Fut>(ambient: &ExecutionContext, op: F) -> Result<()>
where
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let session = Session::begin(ambient);
    let handle = session.handle();
    session.submit(op(handle));
    session.finish()
}

/// Blocks the calling thread until `op` completes, returning its produced
/// value.
///
/// # Examples
///
/// ```rust
/// use sync_bridge::{run_sync_with, ExecutionContext};
///
/// let value = run_sync_with(&ExecutionContext::Detached, |_session| async {
///     Ok(21 * 2)
/// })
/// .unwrap();
/// assert_eq!(value, 42);
/// ```
pub fn run_sync_with<T, F, Fut>(ambient: &ExecutionContext, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let session = Session::begin(ambient);
    let handle = session.handle();
    let slot = session.submit_with(op(handle));
    session.finish()?;
    slot.take().ok_or_else(|| {
        BridgeError::Internal("operation completed without producing a value".into())
    })
}

/// Schedules `op` detached from any session: on a worker thread, never on
/// the caller's, never blocking it. A fault is handed to `on_error` when
/// one is supplied and otherwise logged and dropped; nothing ever
/// propagates back to the caller.
///
/// The worker drives `op` on a current-thread runtime, so timers and I/O
/// inside the operation work without any ambient runtime at the call site.
///
/// # Examples
///
/// ```rust
/// use sync_bridge::fire_and_forget;
///
/// fire_and_forget(async { Ok(()) }, None);
/// ```
pub fn fire_and_forget<F>(op: F, on_error: Option<ErrorHandler>)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("sync-bridge-detached".into())
        .spawn(move || {
            let outcome = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(op),
                Err(error) => Err(anyhow::Error::new(error)
                    .context("failed to build detached worker runtime")),
            };
            if let Err(fault) = outcome {
                match on_error {
                    Some(handler) => handler(fault),
                    None => debug!(%fault, "detached operation failed with no handler"),
                }
            }
        });
    if let Err(error) = spawned {
        warn!(%error, "failed to spawn detached worker thread");
    }
}
