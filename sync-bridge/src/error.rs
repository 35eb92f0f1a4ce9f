use thiserror::Error;

/// Failures surfaced by the bridge to the thread that drives a session.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// An operation submitted into a session raised a fault. Only the first
    /// fault of a session is surfaced; later ones are suppressed.
    #[error("an operation submitted to the bridge failed: {0}")]
    TaskFailed(anyhow::Error),

    /// Synchronous dispatch into a bridge queue. The drain loop is the only
    /// consumer of the queue, so a blocking dispatch from within it would
    /// deadlock the driver thread against itself.
    #[error("synchronous dispatch into a bridge queue is not supported")]
    SendUnsupported,

    /// Bridge infrastructure failure, as opposed to a fault raised by
    /// submitted work.
    #[error("internal bridge error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// The original fault raised by submitted work, when there is one.
    pub fn fault(&self) -> Option<&anyhow::Error> {
        match self {
            Self::TaskFailed(fault) => Some(fault),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
