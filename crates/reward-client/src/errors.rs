//! Reward client errors.

use thiserror::Error;

/// Failures surfaced to reward client callers.
///
/// These are all local to one request or to the client itself; connection
/// loss is never reported directly (in-flight callers run into `Deadline`
/// instead).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The bounded command queue was full. Backpressure is surfaced to the
    /// caller, not absorbed by blocking.
    #[error("reward command queue full")]
    QueueFull,

    /// No response arrived within the request deadline.
    #[error("request deadline exceeded")]
    Deadline,

    /// The client task is gone.
    #[error("reward client closed")]
    ClientClosed,

    #[error("failed to connect to reward service: {0}")]
    Connect(String),

    #[error("wire failure: {0}")]
    Wire(String),

    /// The service answered the request with an error.
    #[error("reward service error: {0}")]
    Remote(String),

    /// The service broke the protocol (unexpected or undecodable message).
    #[error("protocol violation: {0}")]
    Protocol(String),
}
