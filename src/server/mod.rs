//! Relay server
//!
//! Accepts TCP connections, upgrades them to WebSocket control connections on
//! the configured path and runs one connection supervisor per client.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{ServerConfig, DEFAULT_ICE_SERVER};
pub use connection::Connection;
pub use listener::RelayServer;
