//! Control messages
//!
//! Every frame on the control connection is a JSON envelope
//! `{"Key": <string>, "Value": <any>}`. Field names are matched
//! case-insensitively on input for the lowercase spellings older clients
//! send.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::error::ProtocolError;
use crate::registry::ChannelName;

/// Client → server keys
pub mod keys {
    pub const SESSION_PUBLISHER: &str = "session_publisher";
    pub const SESSION_SUBSCRIBER: &str = "session_subscriber";
    pub const ICE_CANDIDATE: &str = "ice_candidate";
    pub const CONNECT_PUBLISHER: &str = "connect_publisher";
    pub const CONNECT_SUBSCRIBER: &str = "connect_subscriber";
    pub const GET_CHANNELS: &str = "get_channels";

    pub const SD_ANSWER: &str = "sd_answer";
    pub const SESSION_RECEIVED: &str = "session_received";
    pub const PASSWORD_REQUIRED: &str = "password_required";
    pub const CHANNELS: &str = "channels";
    pub const ERROR: &str = "error";
    pub const INFO: &str = "info";
    pub const CHANNEL_CLOSED: &str = "channel_closed";
}

/// Info text sent when ICE connects
pub const INFO_ICE_CONNECTED: &str = "ice connected";
/// Info text sent when ICE disconnects
pub const INFO_ICE_DISCONNECTED: &str = "ice disconnected";

/// Wire envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
    #[serde(rename = "Value", alias = "value", default)]
    pub value: Value,
}

/// `connect_publisher` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectPublisher {
    #[serde(rename = "Channel", alias = "channel", default)]
    pub channel: String,
    #[serde(rename = "Password", alias = "password", default)]
    pub password: String,
}

/// `connect_subscriber` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectSubscriber {
    #[serde(rename = "Channel", alias = "channel", default)]
    pub channel: String,
}

/// Message from client to server
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publisher's session offer
    SessionPublisher(RTCSessionDescription),
    /// Subscriber's session offer
    SessionSubscriber(RTCSessionDescription),
    /// Remote ICE candidate; `None` marks end of candidates
    IceCandidate(Option<RTCIceCandidateInit>),
    /// Claim a channel as its publisher
    ConnectPublisher(ConnectPublisher),
    /// Join a channel as a subscriber
    ConnectSubscriber(ConnectSubscriber),
    /// List live channels
    GetChannels,
}

impl ClientMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;
        Self::from_envelope(envelope)
    }

    /// Interpret an already-decoded envelope
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { key, value } = envelope;

        match key.as_str() {
            keys::SESSION_PUBLISHER => Ok(Self::SessionPublisher(payload(&key, value)?)),
            keys::SESSION_SUBSCRIBER => Ok(Self::SessionSubscriber(payload(&key, value)?)),
            keys::ICE_CANDIDATE => Ok(Self::IceCandidate(payload(&key, value)?)),
            keys::CONNECT_PUBLISHER => Ok(Self::ConnectPublisher(payload(&key, value)?)),
            keys::CONNECT_SUBSCRIBER => Ok(Self::ConnectSubscriber(payload(&key, value)?)),
            keys::GET_CHANNELS => Ok(Self::GetChannels),
            _ => Err(ProtocolError::UnknownKey(key)),
        }
    }

    /// Wire key of this message
    pub fn key(&self) -> &'static str {
        match self {
            Self::SessionPublisher(_) => keys::SESSION_PUBLISHER,
            Self::SessionSubscriber(_) => keys::SESSION_SUBSCRIBER,
            Self::IceCandidate(_) => keys::ICE_CANDIDATE,
            Self::ConnectPublisher(_) => keys::CONNECT_PUBLISHER,
            Self::ConnectSubscriber(_) => keys::CONNECT_SUBSCRIBER,
            Self::GetChannels => keys::GET_CHANNELS,
        }
    }
}

fn payload<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
        key: key.to_owned(),
        source,
    })
}

/// Message from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// SDP of the session answer
    SdAnswer(String),
    /// Subscriber offer stored, waiting for channel selection
    SessionReceived,
    /// Local ICE candidate
    IceCandidate(RTCIceCandidateInit),
    /// Publishing needs a password
    PasswordRequired,
    /// Live channel names
    Channels(Vec<ChannelName>),
    /// Error description
    Error(String),
    /// Status text
    Info(String),
    /// The subscribed channel's publisher left
    ChannelClosed(ChannelName),
}

impl ServerMessage {
    /// Wire key of this message
    pub fn key(&self) -> &'static str {
        match self {
            Self::SdAnswer(_) => keys::SD_ANSWER,
            Self::SessionReceived => keys::SESSION_RECEIVED,
            Self::IceCandidate(_) => keys::ICE_CANDIDATE,
            Self::PasswordRequired => keys::PASSWORD_REQUIRED,
            Self::Channels(_) => keys::CHANNELS,
            Self::Error(_) => keys::ERROR,
            Self::Info(_) => keys::INFO,
            Self::ChannelClosed(_) => keys::CHANNEL_CLOSED,
        }
    }

    /// Build the wire envelope
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let value = match self {
            Self::SdAnswer(sdp) => Value::String(sdp.clone()),
            Self::SessionReceived | Self::PasswordRequired => Value::Null,
            Self::IceCandidate(candidate) => serde_json::to_value(candidate)?,
            Self::Channels(names) => serde_json::to_value(names)?,
            Self::Error(text) | Self::Info(text) => Value::String(text.clone()),
            Self::ChannelClosed(name) => serde_json::to_value(name)?,
        };

        Ok(Envelope {
            key: self.key().to_owned(),
            value,
        })
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }
}
