//! Media engine seam
//!
//! The signaling session never touches the WebRTC stack directly. It asks an
//! [`Engine`] to negotiate a publisher or subscriber session and gets back a
//! [`Peer`] handle plus the SDP answer. Everything the stack reports later
//! (ICE state, local candidates, the publisher's inbound track) arrives as a
//! [`PeerEvent`] on the bounded queue passed in at negotiation time, so the
//! session consumes engine notifications from its own event loop instead of
//! from re-entrant callbacks.
//!
//! [`WebRtcEngine`] is the production implementation on the `webrtc` crate.

pub mod peer;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::registry::SharedTrack;
use crate::relay::{InboundTrack, KeyframeRequester};

pub use peer::{WebRtcEngine, WebRtcPeer};

/// Notification from the engine about one peer
#[derive(Debug)]
pub enum PeerEvent {
    /// ICE connection state changed
    IceConnectionState(RTCIceConnectionState),
    /// A local ICE candidate was gathered and should be sent to the client
    IceCandidate(RTCIceCandidateInit),
    /// The publisher's inbound audio track arrived
    Track(InboundTrack),
}

/// Result of a successful negotiation
pub struct Negotiated {
    /// Handle to the negotiated peer
    pub peer: Arc<dyn Peer>,
    /// SDP answer to send back to the client
    pub answer: RTCSessionDescription,
}

/// A negotiated media session with one client
///
/// Keyframe requests go through the supertrait so a peer can be handed to
/// the relay directly.
#[async_trait]
pub trait Peer: KeyframeRequester {
    /// Apply a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit)
        -> Result<(), webrtc::Error>;

    /// Close the media session
    async fn close(&self) -> Result<(), webrtc::Error>;
}

/// Factory for negotiated media sessions
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Negotiate a session that receives exactly one audio stream.
    ///
    /// The inbound track is delivered as [`PeerEvent::Track`] once media
    /// starts flowing, which only happens after ICE has connected.
    async fn negotiate_publisher(
        &self,
        offer: RTCSessionDescription,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Negotiated, webrtc::Error>;

    /// Negotiate a session that sends the channel's shared outbound track
    async fn negotiate_subscriber(
        &self,
        offer: RTCSessionDescription,
        track: SharedTrack,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Negotiated, webrtc::Error>;
}
