//! Signaling session
//!
//! One [`SignalingSession`] per control connection. It turns client messages
//! and engine notifications into registry operations, negotiation calls and
//! outgoing [`ServerMessage`]s, which the connection drains from the outbox
//! after every step.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::context::SessionConfig;
use super::error::SessionError;
use super::state::{Role, SessionPhase};
use crate::engine::{Engine, Negotiated, Peer, PeerEvent};
use crate::protocol::{
    ClientMessage, ConnectPublisher, ConnectSubscriber, ServerMessage, INFO_ICE_CONNECTED,
    INFO_ICE_DISCONNECTED,
};
use crate::registry::{ChannelName, ChannelRegistry, RegistryError, Subscriber, SubscriberId};
use crate::relay::{InboundTrack, PacketSink, Relay, RelayError};

/// Remote candidates held until a peer exists
const MAX_PENDING_CANDIDATES: usize = 64;

/// Something that happened outside the control connection
#[derive(Debug)]
pub enum SessionEvent {
    /// Notification from the media engine
    Peer(PeerEvent),
    /// The publisher's relay failed
    RelayFailed(RelayError),
    /// The subscribed channel lost its publisher
    ChannelClosed,
}

/// Per-connection signaling state machine
pub struct SignalingSession<E: Engine> {
    id: u64,
    registry: Arc<ChannelRegistry>,
    engine: Arc<E>,
    config: SessionConfig,

    phase: SessionPhase,
    role: Option<Role>,
    peer: Option<Arc<dyn Peer>>,
    pending_candidates: Vec<RTCIceCandidateInit>,

    /// Joined channel, set on entering Active
    channel: Option<ChannelName>,

    // Publisher side
    inbound: Option<InboundTrack>,
    pending_publish: Option<ChannelName>,
    relay: Option<Relay>,

    // Subscriber side
    subscriber_offer: Option<RTCSessionDescription>,
    selected_channel: Option<ChannelName>,
    subscriber_id: Option<SubscriberId>,
    teardown: Option<CancellationToken>,

    outbox: VecDeque<ServerMessage>,
    /// Events of the installed peer only; a discarded peer's queue is dropped
    peer_events: Option<mpsc::Receiver<PeerEvent>>,
    relay_failures_tx: mpsc::Sender<RelayError>,
    relay_failures: mpsc::Receiver<RelayError>,
    cancel: CancellationToken,
}

impl<E: Engine> SignalingSession<E> {
    /// Create a session in phase `New`
    pub fn new(
        id: u64,
        registry: Arc<ChannelRegistry>,
        engine: Arc<E>,
        config: SessionConfig,
    ) -> Self {
        let (relay_failures_tx, relay_failures) = mpsc::channel(1);

        Self {
            id,
            registry,
            engine,
            config,
            phase: SessionPhase::New,
            role: None,
            peer: None,
            pending_candidates: Vec::new(),
            channel: None,
            inbound: None,
            pending_publish: None,
            relay: None,
            subscriber_offer: None,
            selected_channel: None,
            subscriber_id: None,
            teardown: None,
            outbox: VecDeque::new(),
            peer_events: None,
            relay_failures_tx,
            relay_failures,
            cancel: CancellationToken::new(),
        }
    }

    /// Session ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Channel joined, if active
    pub fn channel(&self) -> Option<&ChannelName> {
        self.channel.as_ref()
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.phase.is_closing()
    }

    /// Token cancelled when the session closes
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take every message queued for the client
    pub fn drain_outbox(&mut self) -> impl Iterator<Item = ServerMessage> + '_ {
        self.outbox.drain(..)
    }

    /// Wait for the next engine, relay or teardown event
    pub async fn next_event(&mut self) -> SessionEvent {
        let teardown = self.teardown.clone();

        tokio::select! {
            Some(event) = recv_peer_event(self.peer_events.as_mut()) => SessionEvent::Peer(event),
            Some(err) = self.relay_failures.recv() => SessionEvent::RelayFailed(err),
            _ = wait_cancelled(teardown.as_ref()) => SessionEvent::ChannelClosed,
            else => std::future::pending().await,
        }
    }

    /// Handle one control message
    pub async fn handle_message(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        tracing::debug!(
            session_id = self.id,
            key = message.key(),
            phase = %self.phase,
            "Control message"
        );

        if self.phase.is_closing() {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        match message {
            ClientMessage::SessionPublisher(offer) => self.on_publisher_offer(offer).await,
            ClientMessage::SessionSubscriber(offer) => self.on_subscriber_offer(offer).await,
            ClientMessage::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
            ClientMessage::ConnectPublisher(request) => self.on_connect_publisher(request).await,
            ClientMessage::ConnectSubscriber(request) => self.on_connect_subscriber(request).await,
            ClientMessage::GetChannels => {
                let channels = self.registry.get_channels().await;
                self.outbox.push_back(ServerMessage::Channels(channels));
                Ok(())
            }
        }
    }

    /// Handle one event from [`next_event`](Self::next_event)
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        if self.phase.is_closing() {
            return Ok(());
        }

        match event {
            SessionEvent::Peer(PeerEvent::IceConnectionState(state)) => {
                self.on_ice_state(state).await;
                Ok(())
            }
            SessionEvent::Peer(PeerEvent::IceCandidate(candidate)) => {
                self.outbox.push_back(ServerMessage::IceCandidate(candidate));
                Ok(())
            }
            SessionEvent::Peer(PeerEvent::Track(track)) => self.on_inbound_track(track).await,
            SessionEvent::RelayFailed(err) => {
                tracing::warn!(
                    session_id = self.id,
                    channel = ?self.channel,
                    error = %err,
                    "Relay failed"
                );
                self.outbox.push_back(ServerMessage::Error(err.to_string()));
                self.close().await;
                Ok(())
            }
            SessionEvent::ChannelClosed => {
                if let Some(name) = self.channel.clone() {
                    tracing::info!(
                        session_id = self.id,
                        channel = %name,
                        "Channel closed by publisher"
                    );
                    self.outbox.push_back(ServerMessage::ChannelClosed(name));
                }
                self.close().await;
                Ok(())
            }
        }
    }

    async fn on_publisher_offer(
        &mut self,
        offer: RTCSessionDescription,
    ) -> Result<(), SessionError> {
        self.check_offer(&offer, Role::Publisher)?;

        let (events_tx, events) = self.peer_event_queue();
        let Negotiated { peer, answer } =
            self.engine.negotiate_publisher(offer, events_tx).await?;

        self.role = Some(Role::Publisher);
        self.phase = SessionPhase::Negotiating;
        self.install_peer(peer, events).await;

        tracing::debug!(session_id = self.id, "Publisher session negotiated");

        self.outbox.push_back(ServerMessage::SdAnswer(answer.sdp));
        if self.config.requires_password() {
            self.outbox.push_back(ServerMessage::PasswordRequired);
        }
        Ok(())
    }

    async fn on_subscriber_offer(
        &mut self,
        offer: RTCSessionDescription,
    ) -> Result<(), SessionError> {
        self.check_offer(&offer, Role::Subscriber)?;

        self.role = Some(Role::Subscriber);
        self.phase = SessionPhase::Negotiating;
        self.subscriber_offer = Some(offer);
        self.outbox.push_back(ServerMessage::SessionReceived);

        match self.selected_channel.take() {
            Some(name) => self.join_channel(name).await,
            None => Ok(()),
        }
    }

    /// Common checks for an incoming offer
    fn check_offer(&self, offer: &RTCSessionDescription, role: Role) -> Result<(), SessionError> {
        if !self.phase.is_negotiable() {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        match self.role {
            Some(current) if current != role => return Err(SessionError::RoleConflict(current)),
            _ => {}
        }
        if self.peer.is_some() || self.subscriber_offer.is_some() {
            return Err(SessionError::AlreadyNegotiated);
        }
        if offer.sdp_type != RTCSdpType::Offer {
            return Err(SessionError::NotAnOffer);
        }
        Ok(())
    }

    async fn on_remote_candidate(
        &mut self,
        candidate: Option<RTCIceCandidateInit>,
    ) -> Result<(), SessionError> {
        // Null or empty marks end of candidates
        let Some(candidate) = candidate.filter(|c| !c.candidate.is_empty()) else {
            tracing::debug!(session_id = self.id, "End of remote candidates");
            return Ok(());
        };

        match &self.peer {
            Some(peer) => peer.add_ice_candidate(candidate).await?,
            None if self.pending_candidates.len() < MAX_PENDING_CANDIDATES => {
                self.pending_candidates.push(candidate);
            }
            None => {
                tracing::warn!(session_id = self.id, "Too many early candidates, dropping");
            }
        }
        Ok(())
    }

    async fn on_connect_publisher(
        &mut self,
        request: ConnectPublisher,
    ) -> Result<(), SessionError> {
        match self.role {
            Some(Role::Publisher) => {}
            Some(Role::Subscriber) => return Err(SessionError::RoleConflict(Role::Subscriber)),
            None => return Err(SessionError::NotNegotiated),
        }
        if self.phase != SessionPhase::Negotiating {
            return Err(SessionError::InvalidPhase(self.phase));
        }
        if let Some(pending) = &self.pending_publish {
            return Err(SessionError::PublishPending(pending.clone()));
        }

        let name = ChannelName::parse(request.channel)?;

        if self.registry.is_publishing(&name).await {
            return Err(RegistryError::AlreadyInUse(name).into());
        }
        if !self.config.check_password(&request.password) {
            tracing::warn!(
                session_id = self.id,
                channel = %name,
                "Publisher rejected: wrong password"
            );
            return Err(SessionError::WrongPassword);
        }

        if self.inbound.is_some() {
            self.start_publishing(name).await
        } else {
            tracing::debug!(session_id = self.id, channel = %name, "Waiting for inbound track");
            self.pending_publish = Some(name);
            Ok(())
        }
    }

    async fn on_inbound_track(&mut self, track: InboundTrack) -> Result<(), SessionError> {
        if self.role != Some(Role::Publisher) || self.inbound.is_some() {
            tracing::warn!(
                session_id = self.id,
                track = ?track,
                "Ignoring unexpected inbound track"
            );
            return Ok(());
        }

        self.inbound = Some(track);

        match self.pending_publish.take() {
            Some(name) => self.start_publishing(name).await,
            None => Ok(()),
        }
    }

    /// Register as the channel's publisher and start relaying
    async fn start_publishing(&mut self, name: ChannelName) -> Result<(), SessionError> {
        let (Some(inbound), Some(peer)) = (self.inbound.clone(), self.peer.clone()) else {
            return Err(SessionError::NotNegotiated);
        };

        let track = inbound.outbound_track(&name);
        let publisher_id = self.registry.add_publisher(&name, Arc::clone(&track)).await?;

        let outbound: Arc<dyn PacketSink> = track;
        let relay = Relay::start(
            name.clone(),
            inbound,
            outbound,
            peer,
            self.config.keyframe_interval,
            self.relay_failures_tx.clone(),
            self.cancel.child_token(),
        );

        tracing::info!(
            session_id = self.id,
            channel = %name,
            publisher_id = %publisher_id,
            "Publishing"
        );

        self.relay = Some(relay);
        self.channel = Some(name);
        self.phase = SessionPhase::Active(Role::Publisher);
        Ok(())
    }

    async fn on_connect_subscriber(
        &mut self,
        request: ConnectSubscriber,
    ) -> Result<(), SessionError> {
        if self.role == Some(Role::Publisher) {
            return Err(SessionError::RoleConflict(Role::Publisher));
        }
        if !self.phase.is_negotiable() {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        let name = ChannelName::parse(request.channel)?;

        if self.subscriber_offer.is_some() {
            return self.join_channel(name).await;
        }

        // No offer yet: remember the choice and finish when it arrives
        if !self.registry.is_publishing(&name).await {
            return Err(RegistryError::ChannelNotReady(name).into());
        }
        self.role = Some(Role::Subscriber);
        self.selected_channel = Some(name);
        Ok(())
    }

    /// Negotiate against the channel's shared track and subscribe
    async fn join_channel(&mut self, name: ChannelName) -> Result<(), SessionError> {
        let Some(offer) = self.subscriber_offer.clone() else {
            return Err(SessionError::NotNegotiated);
        };

        let handle = self
            .registry
            .get_channel(&name)
            .await
            .ok_or_else(|| RegistryError::ChannelNotReady(name.clone()))?;

        let (events_tx, events) = self.peer_event_queue();
        let Negotiated { peer, answer } = self
            .engine
            .negotiate_subscriber(offer, handle.track, events_tx)
            .await?;

        let subscriber = Subscriber::new();
        let subscriber_id = subscriber.id();
        let teardown = subscriber.teardown_token();

        if let Err(e) = self.registry.add_subscriber(&name, subscriber).await {
            // Publisher left while negotiating; dropping `events` discards
            // anything the closed peer still reports
            if let Err(close_err) = peer.close().await {
                tracing::debug!(session_id = self.id, error = %close_err, "Failed to close peer");
            }
            return Err(e.into());
        }

        self.install_peer(peer, events).await;
        self.outbox.push_back(ServerMessage::SdAnswer(answer.sdp));

        tracing::info!(
            session_id = self.id,
            channel = %name,
            subscriber_id = %subscriber_id,
            publisher_id = %handle.publisher_id,
            "Subscribed"
        );

        self.subscriber_offer = None;
        self.subscriber_id = Some(subscriber_id);
        self.teardown = Some(teardown);
        self.channel = Some(name);
        self.phase = SessionPhase::Active(Role::Subscriber);
        Ok(())
    }

    /// Fresh queue for the events of one negotiation attempt
    fn peer_event_queue(&self) -> (mpsc::Sender<PeerEvent>, mpsc::Receiver<PeerEvent>) {
        mpsc::channel(self.config.event_queue_capacity.max(1))
    }

    /// Keep the negotiated peer and apply any early candidates
    async fn install_peer(&mut self, peer: Arc<dyn Peer>, events: mpsc::Receiver<PeerEvent>) {
        for candidate in self.pending_candidates.drain(..) {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                tracing::warn!(
                    session_id = self.id,
                    error = %e,
                    "Failed to apply queued candidate"
                );
            }
        }
        self.peer = Some(peer);
        self.peer_events = Some(events);
    }

    async fn on_ice_state(&mut self, state: RTCIceConnectionState) {
        match state {
            RTCIceConnectionState::Connected => {
                self.outbox
                    .push_back(ServerMessage::Info(INFO_ICE_CONNECTED.to_owned()));
            }
            RTCIceConnectionState::Disconnected
            | RTCIceConnectionState::Failed
            | RTCIceConnectionState::Closed => {
                tracing::info!(session_id = self.id, state = %state, "ICE connection lost");
                self.outbox
                    .push_back(ServerMessage::Info(INFO_ICE_DISCONNECTED.to_owned()));
                self.close().await;
            }
            _ => {}
        }
    }

    /// Tear the session down
    ///
    /// Safe to call any number of times; registry cleanup runs once.
    pub async fn close(&mut self) {
        if self.phase.is_closing() {
            return;
        }
        let previous = std::mem::replace(&mut self.phase, SessionPhase::Closing);

        self.cancel.cancel();

        if let Some(relay) = self.relay.take() {
            let stats = relay.stats();
            tracing::debug!(
                session_id = self.id,
                channel = %relay.channel(),
                packets = stats.packets_forwarded,
                bytes = stats.bytes_forwarded,
                dropped = stats.packets_dropped,
                "Relay stopping"
            );
            relay.stop();
        }

        match (previous, &self.channel) {
            (SessionPhase::Active(Role::Publisher), Some(name)) => {
                self.registry.remove_publisher(name).await;
            }
            (SessionPhase::Active(Role::Subscriber), Some(name)) => {
                if let Some(id) = self.subscriber_id.take() {
                    self.registry.remove_subscriber(name, id).await;
                }
            }
            _ => {}
        }

        self.pending_publish = None;
        self.selected_channel = None;
        self.teardown = None;

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                tracing::debug!(session_id = self.id, error = %e, "Failed to close peer");
            }
        }

        self.phase = SessionPhase::Closed;
        tracing::debug!(session_id = self.id, previous = %previous, "Session closed");
    }
}

async fn recv_peer_event(events: Option<&mut mpsc::Receiver<PeerEvent>>) -> Option<PeerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
