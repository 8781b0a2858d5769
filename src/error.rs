//! Error taxonomy shared across the server.
//!
//! Lower layers either recover locally or surface one of these tagged kinds;
//! the command router is the only layer that converts them into miniserver
//! wire responses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing required field, malformed file, unknown backend or provider key.
    /// Fatal at startup, a validation failure on admin writes at runtime.
    #[error("config error: {0}")]
    Config(String),

    /// Connection refused, timeout, socket closed. Retried with bounded
    /// backoff by the owning backend.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed vendor payload. The update is dropped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown id in provider/favorite/zone lookups. Reads map this to an
    /// empty response, writes to a no-op ack.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal invariant violated (e.g. favorite slot discontinuity). The
    /// operation is rejected and state rolled back.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Disk full, permission denied. Mapped to HTTP 500 by the router.
    #[error("resource error: {0}")]
    Resource(String),
}

impl ServerError {
    /// Stable kind tag used in wire error payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::NotFound(_) => "not_found",
            Self::Invariant(_) => "invariant",
            Self::Resource(_) => "resource",
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Resource(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
