//! Registry error types

use super::name::ChannelName;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Channel already has a live publisher
    #[error("channel \"{0}\" is already in use")]
    AlreadyInUse(ChannelName),

    /// Channel has no live publisher to subscribe to
    #[error("channel \"{0}\" not ready")]
    ChannelNotReady(ChannelName),
}
