//! The single error domain all gateway operations report through.

use std::time::Duration;

use redpool_proto::WireError;
use thiserror::Error;

/// Result type for all gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every failure a caller can observe from the gateway.
///
/// Pool, transport and server failures are all translated into this one type;
/// callers never see the underlying client internals. Argument problems
/// (`InvalidArgument`, `InvalidAddress`, `Serialize`) are raised before any
/// pool handle is acquired.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No connection became available within the acquire timeout.
    #[error("connection pool exhausted (waited {0:?})")]
    ResourceExhausted(Duration),
    /// Network-level fault talking to the backing store.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
    /// The server sent bytes that do not frame as RESP2.
    #[error("malformed server frame: {0}")]
    Protocol(&'static str),
    /// The server returned a well-formed error reply.
    #[error("server error: {}", String::from_utf8_lossy(.0))]
    Server(Vec<u8>),
    /// The reply was well-formed but not the shape the operation expects.
    #[error("unexpected {0} reply")]
    UnexpectedReply(&'static str),
    /// The caller supplied arguments the gateway rejects up front.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The configured address did not resolve to a socket address.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    /// A textual reply was requested but the payload is not UTF-8.
    #[error("reply is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// JSON (de)serialization of a caller value failed.
    #[error("json conversion failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<WireError> for GatewayError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(err) => GatewayError::Transport(err),
            WireError::Frame(detail) => GatewayError::Protocol(detail),
        }
    }
}

impl GatewayError {
    /// True when the error was produced by the server itself rather than the
    /// transport or the pool.
    pub fn is_server_error(&self) -> bool {
        matches!(self, GatewayError::Server(_))
    }

    /// True for a server error whose code matches `code` (e.g. `NOSCRIPT`).
    pub fn server_code_is(&self, code: &str) -> bool {
        match self {
            GatewayError::Server(message) => message.starts_with(code.as_bytes()),
            _ => false,
        }
    }
}
