//! Channel names
//!
//! A channel is identified by a case-sensitive name made only of ASCII letters,
//! digits and spaces. Names are validated once, at the protocol boundary, and
//! carried as [`ChannelName`] from then on so the registry never sees an
//! unchecked string.

use std::fmt;

/// Reason a channel name was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelNameError {
    /// Name was empty
    #[error("channel cannot be empty")]
    Empty,
    /// Name contained a character outside `[A-Za-z0-9 ]`
    #[error("channel name must contain only alphanumeric characters")]
    InvalidCharacters,
}

/// Validated channel name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Validate and wrap a channel name
    pub fn parse(name: impl Into<String>) -> Result<Self, ChannelNameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ChannelNameError::Empty);
        }
        if !name.chars().all(is_channel_char) {
            return Err(ChannelNameError::InvalidCharacters);
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_channel_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' '
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = ChannelNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl serde::Serialize for ChannelName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
