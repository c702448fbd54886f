//! babelcast server binary

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use babelcast::server::DEFAULT_ICE_SERVER;
use babelcast::{RelayServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "babelcast")]
#[command(about = "WebRTC audio broadcast relay", long_about = None)]
struct Args {
    /// Listen port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Password publishers must present (empty = open)
    #[arg(long, env = "PUBLISHER_PASSWORD", hide_env_values = true)]
    publisher_password: Option<String>,

    /// STUN/TURN server URL (repeatable)
    #[arg(long = "ice-server", default_value = DEFAULT_ICE_SERVER)]
    ice_servers: Vec<String>,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let config = ServerConfig::default()
        .bind(SocketAddr::new(args.bind, args.port))
        .max_connections(args.max_connections)
        .ice_servers(args.ice_servers)
        .publisher_password(args.publisher_password);

    tracing::info!(
        addr = %config.bind_addr,
        password = config.publisher_password.is_some(),
        ice_servers = ?config.ice_servers,
        "Starting babelcast"
    );

    let server = RelayServer::new(config)?;
    server.run_until(shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
