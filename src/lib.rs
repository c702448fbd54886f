//! # babelcast
//!
//! WebRTC audio broadcast relay. One publisher per named channel pushes a
//! live audio stream; any number of subscribers receive it. Clients negotiate
//! their media sessions over a WebSocket control connection and the server
//! forwards the publisher's RTP packets unmodified.
//!
//! ```text
//!  publisher ──WebRTC──► Relay ──► shared outbound track ──WebRTC──► subscribers
//!      │                  ▲                   ▲                          │
//!      └──WebSocket──► SignalingSession ──► ChannelRegistry ◄──WebSocket──┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use babelcast::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> babelcast::Result<()> {
//!     let config = ServerConfig::default().publisher_password(Some("secret".into()));
//!     let server = RelayServer::new(config)?;
//!     server.run().await
//! }
//! ```

pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use engine::{Engine, Peer, PeerEvent, WebRtcEngine};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use registry::{ChannelName, ChannelRegistry, RegistryError};
pub use relay::{Relay, RelayError};
pub use server::{RelayServer, ServerConfig};
pub use session::{SessionError, SignalingSession};
