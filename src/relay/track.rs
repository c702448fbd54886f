//! Track seams between the relay and the media engine
//!
//! The relay only needs three capabilities: read the next RTP packet from a
//! publisher, write a packet to the shared outbound track, and ask the
//! publisher for a keyframe. Each is a small trait with an implementation on
//! the corresponding `webrtc` type.

use std::sync::Arc;

use async_trait::async_trait;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use crate::registry::{ChannelName, SharedTrack};

/// Track ID given to every outbound channel track
pub const OUTBOUND_TRACK_ID: &str = "audio";

/// Source of inbound RTP packets
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Wait for the next packet. An error means the source is finished.
    async fn read_packet(&self) -> Result<Packet, webrtc::Error>;
}

/// Destination for outbound RTP packets
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Write one packet unmodified.
    ///
    /// Returns the bytes delivered across every attached subscriber, so zero
    /// means nobody is attached.
    async fn write_packet(&self, packet: &Packet) -> Result<usize, webrtc::Error>;
}

/// Upstream keyframe feedback
#[async_trait]
pub trait KeyframeRequester: Send + Sync {
    /// Send a picture loss indication for the given media SSRC
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<(), webrtc::Error>;
}

#[async_trait]
impl PacketSource for TrackRemote {
    async fn read_packet(&self) -> Result<Packet, webrtc::Error> {
        let (packet, _attributes) = self.read_rtp().await?;
        Ok(packet)
    }
}

#[async_trait]
impl PacketSink for TrackLocalStaticRTP {
    async fn write_packet(&self, packet: &Packet) -> Result<usize, webrtc::Error> {
        self.write_rtp(packet).await
    }
}

/// A publisher's inbound audio track as delivered by the engine
#[derive(Clone)]
pub struct InboundTrack {
    /// Packet source
    pub source: Arc<dyn PacketSource>,
    /// Codec the publisher negotiated
    pub codec: RTCRtpCodecCapability,
    /// SSRC of the inbound stream, used for keyframe requests
    pub ssrc: u32,
}

impl InboundTrack {
    /// Wrap a remote track from the engine
    pub fn from_remote(track: Arc<TrackRemote>) -> Self {
        let codec = track.codec().capability;
        let ssrc = track.ssrc();

        Self {
            source: track,
            codec,
            ssrc,
        }
    }

    /// Create the channel's shared outbound track with the same codec
    pub fn outbound_track(&self, channel: &ChannelName) -> SharedTrack {
        Arc::new(TrackLocalStaticRTP::new(
            self.codec.clone(),
            OUTBOUND_TRACK_ID.to_owned(),
            channel.to_string(),
        ))
    }
}

impl std::fmt::Debug for InboundTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundTrack")
            .field("codec", &self.codec.mime_type)
            .field("ssrc", &self.ssrc)
            .finish_non_exhaustive()
    }
}
