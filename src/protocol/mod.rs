//! Control protocol
//!
//! JSON envelopes exchanged over the WebSocket control connection.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{
    keys, ClientMessage, ConnectPublisher, ConnectSubscriber, Envelope, ServerMessage,
    INFO_ICE_CONNECTED, INFO_ICE_DISCONNECTED,
};
