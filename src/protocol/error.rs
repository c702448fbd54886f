//! Control protocol error types

/// Violation of the control protocol
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame was not a `{Key, Value}` JSON envelope
    #[error("malformed message: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Envelope was fine but its value didn't match the key
    #[error("invalid value for {key}: {source}")]
    InvalidPayload {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Key not recognised
    #[error("unknown message key {0:?}")]
    UnknownKey(String),

    /// Binary frame on the text-only control connection
    #[error("unexpected binary message")]
    BinaryFrame,
}

impl ProtocolError {
    /// Whether the connection must be closed after reporting this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedEnvelope(_) | Self::BinaryFrame)
    }
}
