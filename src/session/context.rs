//! Per-session settings

use std::time::Duration;

use crate::relay::DEFAULT_KEYFRAME_INTERVAL;

/// Settings every signaling session is created with
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Shared secret required to publish (None = open)
    pub publisher_password: Option<String>,

    /// Interval between keyframe requests sent to the publisher
    pub keyframe_interval: Duration,

    /// Capacity of the engine event queue
    pub event_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            publisher_password: None,
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            event_queue_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Require a password to publish
    pub fn publisher_password(mut self, password: impl Into<String>) -> Self {
        self.publisher_password = Some(password.into());
        self
    }

    /// Set the keyframe request interval
    pub fn keyframe_interval(mut self, interval: Duration) -> Self {
        self.keyframe_interval = interval;
        self
    }

    /// Whether publishing needs a password
    pub fn requires_password(&self) -> bool {
        self.publisher_password.is_some()
    }

    /// Check a publisher's password
    pub fn check_password(&self, password: &str) -> bool {
        match &self.publisher_password {
            Some(expected) => expected == password,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_by_default() {
        let config = SessionConfig::default();

        assert!(!config.requires_password());
        assert!(config.check_password(""));
        assert!(config.check_password("anything"));
        assert_eq!(config.keyframe_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_password_compared_verbatim() {
        let config = SessionConfig::default().publisher_password("secret");

        assert!(config.requires_password());
        assert!(config.check_password("secret"));
        assert!(!config.check_password("Secret"));
        assert!(!config.check_password("secret "));
        assert!(!config.check_password(""));
    }
}
