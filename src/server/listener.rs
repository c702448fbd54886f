//! Relay server listener
//!
//! Handles the TCP accept loop and spawns a connection supervisor per client.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::engine::{Engine, WebRtcEngine};
use crate::error::Result;
use crate::registry::ChannelRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::ServerStats;

/// WebSocket signaling server in front of the channel registry
pub struct RelayServer<E: Engine = WebRtcEngine> {
    config: ServerConfig,
    engine: Arc<E>,
    registry: Arc<ChannelRegistry>,
    stats: Arc<ServerStats>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer<WebRtcEngine> {
    /// Create a server on the `webrtc` engine using the configured ICE servers
    pub fn new(config: ServerConfig) -> Result<Self> {
        let engine = WebRtcEngine::new(config.ice_servers.clone())?;
        Ok(Self::with_engine(config, engine))
    }
}

impl<E: Engine> RelayServer<E> {
    /// Create a server with a custom media engine
    pub fn with_engine(config: ServerConfig, engine: E) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            engine: Arc::new(engine),
            registry: Arc::new(ChannelRegistry::new()),
            stats: Arc::new(ServerStats::new()),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Connection counters
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.ws_path,
            "Relay server listening"
        );

        tokio::select! {
            _ = shutdown => {
                let channels = self.registry.channel_count().await;
                tracing::info!(
                    channels = channels,
                    active = self.stats.active_connections(),
                    "Shutdown signal received"
                );
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        // Signaling messages are small and latency sensitive
        if let Err(e) = socket.set_nodelay(true) {
            tracing::warn!(error = %e, "Failed to configure socket");
        }

        let connection = Connection::new(
            session_id,
            peer_addr,
            &self.config,
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
        );
        let stats = Arc::clone(&self.stats);
        stats.connection_opened();

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run(socket).await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            stats.connection_closed();
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
