use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use trio_common::{Envelope, Role};
use trios::auth::TokenValidator;
use trios::config::ServerConfig;
use trios::registry::Registry;
use trios::ServerState;

pub const TEST_TOKEN: &str = "demo-token";

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        b_tokens: TEST_TOKEN.to_string(),
        max_conns: 1000,
    }
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    pub ws_rx: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    /// Connect and complete the registration handshake for `role`.
    pub async fn register(addr: &SocketAddr, role: Role, token: Option<&str>) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(&Envelope::register(role, token.map(str::to_owned)))
            .await;
        let ack = client.recv_envelope().await;
        assert_eq!(ack, Envelope::registered(role), "expected registration ack");
        client
    }

    pub async fn send(&mut self, envelope: &Envelope) {
        self.send_raw(&envelope.to_json().unwrap()).await;
    }

    pub async fn send_raw(&mut self, raw: &str) {
        self.ws_tx
            .send(Message::Text(raw.to_string()))
            .await
            .unwrap();
    }

    pub async fn recv_envelope(&mut self) -> Envelope {
        self.try_recv_envelope(Duration::from_secs(5))
            .await
            .expect("timeout or stream end waiting for envelope")
    }

    /// Receive the next envelope, or `None` on timeout, close, or stream end.
    pub async fn try_recv_envelope(&mut self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, async {
            while let Some(msg) = self.ws_rx.next().await {
                match msg {
                    Ok(Message::Text(raw)) => return Some(Envelope::decode(&raw).unwrap()),
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => {}
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Wait for the server to close or drop the connection.
    pub async fn expect_closed(&mut self) {
        let res = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(msg) = self.ws_rx.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => return true,
                    _ => {}
                }
            }
            true
        })
        .await;
        assert!(res.unwrap_or(false), "expected connection to close");
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = test_config(addr);
    let state = Arc::new(ServerState {
        registry: Registry::new(TokenValidator::from_csv(&config.b_tokens)),
        config,
        active_connections: AtomicUsize::new(0),
    });

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = trios::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}
