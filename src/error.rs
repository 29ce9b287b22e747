//! Crate error types.

use thiserror::Error;

/// Errors surfaced by the codec, the peer transports, and the client session.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level failure or deadline expiry.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or an unexpected method during the handshake.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer was closed, either locally or by the remote end.
    #[error("stream closed")]
    Closed,

    /// JSON encoding failed; nothing was transmitted.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No RECEIPT frame arrived for the given receipt id in time.
    #[error("receipt timeout: {0}")]
    ReceiptTimeout(String),

    /// A subscription handler panicked inside the listen task.
    #[error("handler panic: {0}")]
    HandlerPanic(String),
}
