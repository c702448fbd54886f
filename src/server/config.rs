//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::relay::DEFAULT_KEYFRAME_INTERVAL;
use crate::session::SessionConfig;

/// Default STUN server handed to every peer connection
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Path the WebSocket control endpoint is served on
    pub ws_path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Interval between WebSocket pings
    pub ping_interval: Duration,

    /// Maximum time a single write to a client may take
    pub write_timeout: Duration,

    /// Interval between keyframe requests sent to publishers
    pub keyframe_interval: Duration,

    /// Capacity of each session's engine event queue
    pub event_queue_capacity: usize,

    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,

    /// Shared secret required to publish (None = open)
    pub publisher_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_owned(),
            max_connections: 0, // Unlimited
            ping_interval: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            event_queue_capacity: 64,
            ice_servers: vec![DEFAULT_ICE_SERVER.to_owned()],
            publisher_password: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket path
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set keyframe request interval
    pub fn keyframe_interval(mut self, interval: Duration) -> Self {
        self.keyframe_interval = interval;
        self
    }

    /// Replace the ICE server list
    pub fn ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Require a password to publish; an empty password leaves publishing open
    pub fn publisher_password(mut self, password: Option<String>) -> Self {
        self.publisher_password = password.filter(|p| !p.is_empty());
        self
    }

    /// Settings for each signaling session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            publisher_password: self.publisher_password.clone(),
            keyframe_interval: self.keyframe_interval,
            event_queue_capacity: self.event_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.keyframe_interval, Duration::from_secs(3));
        assert_eq!(config.ice_servers, vec![DEFAULT_ICE_SERVER.to_owned()]);
        assert!(config.publisher_password.is_none());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_empty_password_is_open() {
        let config = ServerConfig::default().publisher_password(Some(String::new()));
        assert!(config.publisher_password.is_none());

        let config = ServerConfig::default().publisher_password(Some("secret".into()));
        assert_eq!(config.publisher_password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .ws_path("/signal")
            .max_connections(50)
            .ping_interval(Duration::from_secs(5))
            .write_timeout(Duration::from_secs(2))
            .keyframe_interval(Duration::from_secs(1))
            .ice_servers(vec![]);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.ws_path, "/signal");
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.keyframe_interval, Duration::from_secs(1));
        assert!(config.ice_servers.is_empty());
    }

    #[test]
    fn test_session_config() {
        let config = ServerConfig::default()
            .publisher_password(Some("secret".into()))
            .keyframe_interval(Duration::from_secs(2));
        let session = config.session_config();

        assert!(session.check_password("secret"));
        assert_eq!(session.keyframe_interval, Duration::from_secs(2));
        assert_eq!(session.event_queue_capacity, 64);
    }
}
