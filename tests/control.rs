//! End-to-end tests of the WebSocket control protocol

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use babelcast::{RelayServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    server: Arc<RelayServer>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(config.ice_servers(Vec::new())).unwrap());
        let (tx, rx) = oneshot::channel::<()>();

        let running = Arc::clone(&server);
        tokio::spawn(async move {
            running
                .serve_until(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            server,
            shutdown: Some(tx),
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", self.addr))
            .await
            .unwrap();
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text message, skipping ICE chatter
async fn recv(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();

        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["Key"] != "ice_candidate" && value["Key"] != "info" {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn test_get_channels() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut ws = server.connect().await;

    send(&mut ws, json!({"Key": "get_channels"})).await;

    assert_eq!(recv(&mut ws).await, json!({"Key": "channels", "Value": []}));
}

#[tokio::test]
async fn test_unknown_key_reported() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut ws = server.connect().await;

    send(&mut ws, json!({"Key": "set_volume", "Value": 11})).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["Key"], "error");
    assert!(reply["Value"].as_str().unwrap().contains("set_volume"));

    // Still usable
    send(&mut ws, json!({"Key": "get_channels", "Value": null})).await;
    assert_eq!(recv(&mut ws).await["Key"], "channels");
}

#[tokio::test]
async fn test_bad_channel_name() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut ws = server.connect().await;

    send(
        &mut ws,
        json!({"Key": "connect_subscriber", "Value": {"Channel": "bad!name"}}),
    )
    .await;

    assert_eq!(
        recv(&mut ws).await,
        json!({
            "Key": "error",
            "Value": "channel name must contain only alphanumeric characters"
        })
    );
    assert_eq!(server.server.registry().channel_count().await, 0);
}

#[tokio::test]
async fn test_subscribe_to_missing_channel() {
    let server = TestServer::start(ServerConfig::default()).await;
    let mut ws = server.connect().await;

    send(
        &mut ws,
        json!({"Key": "connect_subscriber", "Value": {"Channel": "nochan"}}),
    )
    .await;

    assert_eq!(
        recv(&mut ws).await,
        json!({"Key": "error", "Value": "channel \"nochan\" not ready"})
    );
}

#[tokio::test]
async fn test_wrong_path_rejected() {
    let server = TestServer::start(ServerConfig::default()).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{}/other", server.addr))
        .await
        .unwrap_err();

    assert!(matches!(err, tungstenite::Error::Http(ref response) if response.status() == 404));
}

#[tokio::test]
async fn test_connection_limit() {
    let server = TestServer::start(ServerConfig::default().max_connections(1)).await;
    let mut first = server.connect().await;

    let second = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr)).await;
    assert!(second.is_err());

    send(&mut first, json!({"Key": "get_channels"})).await;
    assert_eq!(recv(&mut first).await["Key"], "channels");
}

#[tokio::test]
async fn test_publisher_offer_answered() {
    let config = ServerConfig::default().publisher_password(Some("secret".into()));
    let server = TestServer::start(config).await;
    let mut ws = server.connect().await;

    // A real client-side offer with one outgoing audio stream
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let api = APIBuilder::new().with_media_engine(media_engine).build();
    let pc = api.new_peer_connection(Default::default()).await.unwrap();
    pc.add_transceiver_from_kind(
        RTPCodecType::Audio,
        Some(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendonly,
            send_encodings: Vec::new(),
        }),
    )
    .await
    .unwrap();
    let offer = pc.create_offer(None).await.unwrap();
    pc.set_local_description(offer.clone()).await.unwrap();

    send(
        &mut ws,
        json!({"Key": "session_publisher", "Value": serde_json::to_value(&offer).unwrap()}),
    )
    .await;

    let answer = recv(&mut ws).await;
    assert_eq!(answer["Key"], "sd_answer");
    assert!(answer["Value"].as_str().unwrap().contains("m=audio"));

    assert_eq!(
        recv(&mut ws).await,
        json!({"Key": "password_required", "Value": null})
    );

    send(
        &mut ws,
        json!({"Key": "connect_publisher", "Value": {"Channel": "radio1", "Password": "nope"}}),
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"Key": "error", "Value": "incorrect password"})
    );

    pc.close().await.unwrap();
}
