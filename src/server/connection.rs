//! Per-connection supervisor
//!
//! Owns everything one control connection runs:
//!
//! ```text
//!   WebSocket ──► reader task ──mpsc──┐
//!                                     ▼
//!   engine / relay / teardown ──► event loop (select!) ──► WebSocket sink
//!                                     ▲
//!   ping interval ────────────────────┘
//! ```
//!
//! Only the event loop touches the signaling session and the WebSocket sink.
//! Every write is bounded by the write timeout so a stalled client cannot
//! wedge the loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::registry::ChannelRegistry;
use crate::server::config::ServerConfig;
use crate::session::SignalingSession;

/// A parsed frame from the reader task
type Inbound = std::result::Result<ClientMessage, ProtocolError>;

/// One client connection
pub struct Connection<E: Engine> {
    session_id: u64,
    peer_addr: SocketAddr,
    ws_path: String,
    ping_interval: Duration,
    write_timeout: Duration,
    queue_capacity: usize,
    session: SignalingSession<E>,
}

impl<E: Engine> Connection<E> {
    /// Create a connection with a fresh signaling session
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: &ServerConfig,
        registry: Arc<ChannelRegistry>,
        engine: Arc<E>,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            ws_path: config.ws_path.clone(),
            ping_interval: config.ping_interval,
            write_timeout: config.write_timeout,
            queue_capacity: config.event_queue_capacity.max(1),
            session: SignalingSession::new(session_id, registry, engine, config.session_config()),
        }
    }

    /// Upgrade the socket to a WebSocket on the configured path and serve it
    pub async fn run(self, socket: TcpStream) -> Result<()> {
        let path = self.ws_path.clone();
        let check_path = move |request: &Request, response: Response| {
            if request.uri().path() == path {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(Some("not found".to_owned()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws = tokio::time::timeout(
            self.write_timeout,
            tokio_tungstenite::accept_hdr_async(socket, check_path),
        )
        .await
        .map_err(|_| Error::WriteTimeout)??;

        tracing::debug!(session_id = self.session_id, peer = %self.peer_addr, "WebSocket upgraded");

        self.serve(ws).await
    }

    /// Serve an already upgraded WebSocket until either side ends the session
    pub async fn serve<S>(mut self, ws: WebSocketStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, stream) = ws.split();
        let (inbound_tx, mut inbound) = mpsc::channel(self.queue_capacity);
        let cancel = self.session.cancel_token();

        let reader = tokio::spawn(read_frames(
            self.session_id,
            stream,
            inbound_tx,
            cancel.clone(),
        ));

        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            let mut fatal = false;

            let outcome = tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(Ok(message)) => {
                        self.session.handle_message(message).await.map_err(Error::from)
                    }
                    Some(Err(e)) => {
                        fatal = e.is_fatal();
                        Err(e.into())
                    }
                    None => {
                        tracing::debug!(session_id = self.session_id, "Client went away");
                        break Ok(());
                    }
                },
                event = self.session.next_event() => {
                    self.session.handle_event(event).await.map_err(Error::from)
                }
                _ = ping.tick() => {
                    let ping_frame = Message::Ping(Vec::new());
                    if let Err(e) = write(&mut sink, ping_frame, self.write_timeout).await {
                        break Err(e);
                    }
                    Ok(())
                }
            };

            if let Err(e) = self.flush(&mut sink).await {
                break Err(e);
            }

            if let Err(e) = outcome {
                tracing::debug!(session_id = self.session_id, error = %e, "Request rejected");
                let reply = ServerMessage::Error(e.to_string());
                if let Err(e) = self.send(&mut sink, &reply).await {
                    break Err(e);
                }
                if fatal {
                    break Ok(());
                }
            }

            if self.session.is_closed() {
                break Ok(());
            }
        };

        self.session.close().await;
        // Best effort; the client may already be gone
        let _ = self.flush(&mut sink).await;
        let _ = tokio::time::timeout(self.write_timeout, sink.close()).await;

        cancel.cancel();
        reader.abort();

        if let Err(e) = &result {
            tracing::debug!(
                session_id = self.session_id,
                error = %e,
                "Connection ended with error"
            );
        }
        result
    }

    /// Write everything the session queued
    async fn flush(
        &mut self,
        sink: &mut WsSink<impl AsyncRead + AsyncWrite + Unpin>,
    ) -> Result<()> {
        let pending: Vec<ServerMessage> = self.session.drain_outbox().collect();
        for message in &pending {
            self.send(sink, message).await?;
        }
        Ok(())
    }

    async fn send(
        &self,
        sink: &mut WsSink<impl AsyncRead + AsyncWrite + Unpin>,
        message: &ServerMessage,
    ) -> Result<()> {
        tracing::debug!(session_id = self.session_id, key = message.key(), "Sending");
        let text = message.to_json()?;
        write(sink, Message::Text(text), self.write_timeout).await
    }
}

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

/// Send one frame, giving up after `timeout`
async fn write<K>(sink: &mut K, message: Message, timeout: Duration) -> Result<()>
where
    K: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(timeout, sink.send(message)).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::WriteTimeout),
    }
}

/// Reader task: parse text frames and hand them to the event loop
///
/// Ends on read error, close frame, binary frame or a malformed envelope.
/// Dropping `tx` tells the event loop the client is gone.
async fn read_frames<S>(
    session_id: u64,
    mut stream: SplitStream<WebSocketStream<S>>,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };

        let parsed = match frame {
            Some(Ok(Message::Text(text))) => ClientMessage::parse(&text),
            Some(Ok(Message::Binary(_))) => Err(ProtocolError::BinaryFrame),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(session_id = session_id, error = %e, "WebSocket read failed");
                break;
            }
        };

        let fatal = matches!(&parsed, Err(e) if e.is_fatal());
        if tx.send(parsed).await.is_err() || fatal {
            break;
        }
    }
}
