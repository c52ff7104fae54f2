#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use trio_common::{Envelope, Role};

type WsRecv = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// CLI arguments for the trio role client.
#[derive(Parser, Debug)]
#[command(name = "trioc")]
#[command(about = "trio relay hub role client")]
#[command(version)]
struct Cli {
    /// WebSocket URL of the hub.
    #[arg(long, default_value = "ws://127.0.0.1:8765", env = "TRIOC_URL")]
    url: String,
    /// Role to register as ("a", "b", or "c").
    #[arg(long, default_value = "b", env = "TRIOC_ROLE")]
    role: String,
    /// Shared-secret token presented when registering as "b".
    #[arg(long, default_value = "demo-token", env = "TRIOC_TOKEN")]
    token: String,
    /// One-shot command to send after registering (honored for role "b").
    #[arg(long)]
    command: Option<String>,
    /// One-shot message payload to send after registering.
    #[arg(long)]
    message: Option<String>,
    /// Target role for --message.
    #[arg(long, default_value = "a")]
    to: String,
    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(cli: &Cli) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match cli.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Read frames until one decodes as an envelope.
///
/// Returns `None` when the stream ends or the hub sends a close frame.
async fn recv_envelope(ws_rx: &mut WsRecv) -> Result<Option<Envelope>> {
    while let Some(msg) = ws_rx.next().await {
        match msg? {
            Message::Text(raw) => {
                return Ok(Some(
                    Envelope::decode(&raw).context("undecodable envelope from hub")?,
                ))
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let role: Role = cli
        .role
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid role: {}", cli.role))?;
    let to: Role = cli
        .to
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid target role: {}", cli.to))?;

    let (ws, _) = tokio_tungstenite::connect_async(&cli.url)
        .await
        .with_context(|| format!("failed to connect to {}", cli.url))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let token = (role == Role::B).then(|| cli.token.clone());
    let register = Envelope::register(role, token);
    ws_tx.send(Message::Text(register.to_json()?)).await?;

    match recv_envelope(&mut ws_rx).await? {
        Some(Envelope::Registered { role }) => println!("registered as {role}"),
        Some(Envelope::Error { error }) => anyhow::bail!("registration rejected: {error}"),
        Some(other) => anyhow::bail!("unexpected reply to register: {other:?}"),
        None => anyhow::bail!("connection closed during registration"),
    }

    if let Some(command) = cli.command {
        let envelope = Envelope::command(Some(command.clone()));
        ws_tx.send(Message::Text(envelope.to_json()?)).await?;
        println!("command sent: {command}");
    }

    if let Some(message) = cli.message {
        let envelope = Envelope::message_to(to, serde_json::Value::String(message.clone()));
        ws_tx.send(Message::Text(envelope.to_json()?)).await?;
        println!("message sent to {to}: {message}");
    }

    // Print everything the hub relays to us until the connection ends.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(raw)) => println!("{raw}"),
            Ok(Message::Binary(data)) => println!("{}", String::from_utf8_lossy(&data)),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("connection error: {e}");
                break;
            }
        }
    }
    debug!("connection closed");

    Ok(())
}
