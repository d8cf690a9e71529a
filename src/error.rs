//! Typed errors. Every `ConnectionError` variant is handled identically by the
//! step wrapper (drop the connection); the distinction exists for `tracing`,
//! not for differing recovery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed HTTP request")]
    MalformedRequest,

    #[error("message exceeded {0} bytes")]
    OversizedMessage(usize),

    #[error("unsupported WebSocket payload length (extended lengths not implemented)")]
    UnsupportedPayloadLength,

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("idle timeout")]
    IdleTimeout,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to create poll instance: {0}")]
    Poll(#[source] std::io::Error),
}
