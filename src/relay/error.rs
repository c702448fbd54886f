//! Relay error types

/// Reason a publisher's relay stopped
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The inbound track stopped delivering packets
    #[error("inbound track closed: {0}")]
    InboundClosed(#[source] webrtc::Error),

    /// Writing to the shared outbound track failed
    #[error("outbound track write failed: {0}")]
    OutboundWrite(#[source] webrtc::Error),
}
