//! Error types for the relay
//!
//! Each layer has its own error enum; [`Error`] is the crate-level type used by
//! the server and connection code, where most failures are fatal to a
//! connection.

use crate::protocol::ProtocolError;
use crate::registry::RegistryError;
use crate::relay::RelayError;
use crate::session::SessionError;

/// Result alias using the crate error type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Media engine failure
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// Control protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Signaling session failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Channel registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Media relay failure
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// A write to the client did not complete within the write timeout
    #[error("write to client timed out")]
    WriteTimeout,
}
