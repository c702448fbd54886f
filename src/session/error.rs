//! Signaling session errors

use super::state::{Role, SessionPhase};
use crate::registry::{ChannelName, ChannelNameError, RegistryError};

/// A rejected client request
///
/// Every variant is recoverable: the client gets an `error` message and the
/// session stays in the phase it was in.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("webrtc session not established")]
    NotNegotiated,

    #[error("webrtc session already established")]
    AlreadyNegotiated,

    #[error("expected an SDP offer")]
    NotAnOffer,

    #[error("session is already a {0}")]
    RoleConflict(Role),

    #[error("not allowed while {0}")]
    InvalidPhase(SessionPhase),

    #[error("already waiting to publish on \"{0}\"")]
    PublishPending(ChannelName),

    #[error("incorrect password")]
    WrongPassword,

    #[error(transparent)]
    Channel(#[from] ChannelNameError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("webrtc negotiation failed: {0}")]
    Negotiation(#[from] webrtc::Error),
}
