//! WebRTC engine on the `webrtc` crate

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{Engine, Negotiated, Peer, PeerEvent};
use crate::registry::SharedTrack;
use crate::relay::{InboundTrack, KeyframeRequester};

/// Size of the buffer used to drain RTCP from subscriber senders
const RTCP_READ_BUFFER: usize = 1500;

/// Engine building `RTCPeerConnection`s with default codecs and interceptors
pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcEngine {
    /// Create an engine using the given STUN/TURN server URLs
    pub fn new(ice_servers: Vec<String>) -> Result<Self, webrtc::Error> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        // NACK, RTCP reports and TWCC; NACK needs RTCP drained from senders
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    /// Create a peer connection with ICE notifications wired to `events`
    async fn new_peer_connection(
        &self,
        events: &mpsc::Sender<PeerEvent>,
    ) -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        let tx = events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                tracing::debug!(state = %state, "ICE connection state changed");
                let _ = tx.send(PeerEvent::IceConnectionState(state)).await;
            })
        }));

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(PeerEvent::IceCandidate(init)).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode local ICE candidate");
                    }
                }
            })
        }));

        Ok(pc)
    }
}

/// Apply the offer and produce the local answer
async fn answer(
    pc: &RTCPeerConnection,
    offer: RTCSessionDescription,
) -> Result<RTCSessionDescription, webrtc::Error> {
    pc.set_remote_description(offer).await?;
    let answer = pc.create_answer(None).await?;
    pc.set_local_description(answer.clone()).await?;
    Ok(answer)
}

/// Hand out the peer, or close it if any step after creation failed
async fn finish_negotiation(
    pc: Arc<RTCPeerConnection>,
    answer: Result<RTCSessionDescription, webrtc::Error>,
) -> Result<Negotiated, webrtc::Error> {
    match answer {
        Ok(answer) => Ok(Negotiated {
            peer: Arc::new(WebRtcPeer { pc }),
            answer,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Negotiation failed, closing peer connection");
            if let Err(close_err) = pc.close().await {
                tracing::debug!(error = %close_err, "Failed to close peer connection");
            }
            Err(e)
        }
    }
}

impl WebRtcEngine {
    async fn answer_publisher(
        &self,
        pc: &RTCPeerConnection,
        offer: RTCSessionDescription,
        events: &mpsc::Sender<PeerEvent>,
    ) -> Result<RTCSessionDescription, webrtc::Error> {
        // Allow exactly one inbound audio stream
        pc.add_transceiver_from_kind(
            RTPCodecType::Audio,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: Vec::new(),
            }),
        )
        .await?;

        let tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                Box::pin(async move {
                    if track.kind() != RTPCodecType::Audio {
                        tracing::warn!(kind = %track.kind(), "Ignoring non-audio track");
                        return;
                    }
                    let inbound = InboundTrack::from_remote(track);
                    tracing::debug!(track = ?inbound, "Inbound track received");
                    let _ = tx.send(PeerEvent::Track(inbound)).await;
                })
            },
        ));

        answer(pc, offer).await
    }

    async fn answer_subscriber(
        &self,
        pc: &RTCPeerConnection,
        offer: RTCSessionDescription,
        track: SharedTrack,
    ) -> Result<RTCSessionDescription, webrtc::Error> {
        let sender = pc
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let answer = answer(pc, offer).await?;

        // Interceptors only see incoming RTCP if someone reads it.
        // Ends once the sender is stopped by closing the connection.
        tokio::spawn(async move {
            let mut buf = vec![0u8; RTCP_READ_BUFFER];
            while sender.read(&mut buf).await.is_ok() {}
        });

        Ok(answer)
    }
}

#[async_trait]
impl Engine for WebRtcEngine {
    async fn negotiate_publisher(
        &self,
        offer: RTCSessionDescription,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Negotiated, webrtc::Error> {
        let pc = self.new_peer_connection(&events).await?;
        let answer = self.answer_publisher(&pc, offer, &events).await;
        finish_negotiation(pc, answer).await
    }

    async fn negotiate_subscriber(
        &self,
        offer: RTCSessionDescription,
        track: SharedTrack,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Negotiated, webrtc::Error> {
        let pc = self.new_peer_connection(&events).await?;
        let answer = self.answer_subscriber(&pc, offer, track).await;
        finish_negotiation(pc, answer).await
    }
}

/// A negotiated `RTCPeerConnection`
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl KeyframeRequester for WebRtcPeer {
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<(), webrtc::Error> {
        self.pc
            .write_rtcp(&[Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            })])
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Peer for WebRtcPeer {
    async fn add_ice_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), webrtc::Error> {
        self.pc.add_ice_candidate(candidate).await
    }

    async fn close(&self) -> Result<(), webrtc::Error> {
        self.pc.close().await
    }
}
