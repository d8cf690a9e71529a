//! Compile-time knobs. The process surface is fixed: no flags, no
//! environment variables besides the ambient `RUST_LOG` read by `tracing-subscriber`.

use std::time::Duration;

/// Default listening port, dual-stacked IPv4/IPv6.
pub const PORT: u16 = 8081;

/// `listen()` backlog.
pub const BACKLOG: i32 = 5;

/// HTTP request / WebSocket message size ceiling. Exceeding this drops the connection.
pub const MAX_MESSAGE_SIZE: usize = 1 << 13;

/// Largest WebSocket payload this codec understands (single-byte length field).
pub const MAX_WS_PAYLOAD: usize = 125;

/// Number of recent points kept for replay to newly-upgraded peers.
pub const POINT_COUNT: usize = 1000;

/// Idle timeout for the HTTP phases (HttpRequesting / HttpResponding).
pub const HTTP_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest request-line path / header value the HTTP mini-parser will capture.
pub const HTTP_FIELD_MAX: usize = 30;

pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
