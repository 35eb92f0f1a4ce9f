//! Queue-backed synchronous execution bridge for async operations.
//!
//! This crate lets one thread block while asynchronous work, including any
//! continuations that work schedules along the way, runs to completion on
//! that same thread. Continuations resumed on other threads (timers,
//! channels, I/O completions) are marshaled back onto a per-session work
//! queue whose single consumer is the blocked caller, so everything
//! user-visible executes strictly serialized on one driver thread.
//!
//! # Architecture
//!
//! Two halves:
//!
//! - `queue`: an unbounded multi-producer FIFO of work items with a
//!   blocking single-consumer pop, and the drain loop that runs them.
//! - `session`: the bridging API. A [`Session`] counts submitted
//!   operations that are still live, captures the first fault any of them
//!   raises, and posts an end-of-session sentinel exactly when the last
//!   one completes. [`Session::finish`] drains on the calling thread until
//!   the sentinel has run; the counter alone never ends a session, so
//!   continuations already queued when it hits zero still execute.
//!
//! Ambient state is explicit: callers thread an [`ExecutionContext`]
//! through instead of relying on a thread-global current context. Opening
//! a session under a `Bridged` context inherits the active queue, which is
//! what makes a nested blocking call on the driver thread drain instead of
//! deadlock.
//!
//! # Examples
//!
//! ```rust
//! use sync_bridge::{run_sync_with, ExecutionContext};
//!
//! let value = run_sync_with(&ExecutionContext::Detached, |_session| async {
//!     Ok("done")
//! })
//! .unwrap();
//! assert_eq!(value, "done");
//! ```
//!
//! Faults submitted into a session surface exactly once, first one wins:
//!
//! ```rust
//! use sync_bridge::{run_sync, BridgeError, ExecutionContext};
//!
//! let err = run_sync(&ExecutionContext::Detached, |_session| async {
//!     Err(anyhow::anyhow!("boom"))
//! })
//! .unwrap_err();
//! assert!(matches!(err, BridgeError::TaskFailed(_)));
//! ```

pub mod bridge;
pub mod context;
pub mod error;
pub mod session;

mod queue;
mod task;

pub use bridge::{fire_and_forget, run_sync, run_sync_with, ErrorHandler};
pub use context::{ExecutionContext, QueueHandle};
pub use error::{BridgeError, Result};
pub use session::{Session, SessionHandle};
pub use task::ValueSlot;
