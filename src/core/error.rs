//! Error types for bridge operations.

use thiserror::Error;

/// Errors produced by the registry, the admission bridge and the action handler.
///
/// The `Display` text of the request-level variants is exactly the `message`
/// placed into the `error` reply envelope, so callers built against the wire
/// protocol can match on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A required request field is absent.
    #[error("missing {0}")]
    MissingField(&'static str),
    /// The request carried no `action` field.
    #[error("no action provided")]
    NoAction,
    /// A request field is present but has the wrong shape.
    #[error("invalid {0}")]
    InvalidField(&'static str),
    /// Unregister attempted with an address other than the registered one.
    #[error("handler ID mismatch")]
    HandlerMismatch,
    /// The referenced project does not exist.
    #[error("no such project")]
    NotFound,
    /// The host scheduler declined the build request.
    #[error("failed to schedule")]
    SchedulingFailure,
    /// The request named an action that is not implemented.
    #[error("unknown action {0}")]
    UnknownAction(String),
    /// No reply from the decision service before the deadline.
    #[error("timed out waiting for reply")]
    Timeout,
    /// The bus refused the request.
    #[error("unable to send message: {0}")]
    SendFailed(String),
    /// Every reply sender was dropped without a reply.
    #[error("reply channel closed")]
    NoReply,
    /// The dispatch pool is no longer accepting work.
    #[error("dispatch pool has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal failure (thread spawn, channel setup).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
