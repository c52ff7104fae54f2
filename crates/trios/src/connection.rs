use crate::error::HubError;
use crate::metrics::{counters, gauges, histograms};
use crate::registry::ConnHandle;
use crate::server::ServerState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use trio_common::{Envelope, Role};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Delivery queue depth per connection; envelopes beyond this are dropped.
const DELIVERY_QUEUE_DEPTH: usize = 256;

struct ConnGuard {
    state: Arc<ServerState>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Serialize and send one envelope on the owning connection's socket.
async fn send_envelope(ws_tx: &mut WsSink, envelope: &Envelope) -> Result<(), HubError> {
    let text = envelope.to_json()?;
    ws_tx
        .send(Message::Text(text))
        .await
        .map_err(HubError::WebSocket)
}

/// Send `err` back as an `error` envelope, then surface it to the caller.
///
/// The reply is best-effort: a peer that is already gone does not mask the
/// original rejection.
async fn reject<T>(ws_tx: &mut WsSink, err: HubError) -> Result<T, HubError> {
    counters::registrations_total("rejected");
    let _ = send_envelope(ws_tx, &Envelope::error(err.to_string())).await;
    Err(err)
}

/// Read frames until a text or binary frame arrives, answering pings.
///
/// Returns `Ok(None)` when the stream ends or the peer sends a close frame.
async fn next_frame(ws_tx: &mut WsSink, ws_rx: &mut WsRecv) -> Result<Option<String>, HubError> {
    while let Some(msg) = ws_rx.next().await {
        match msg.map_err(HubError::WebSocket)? {
            Message::Text(raw) => return Ok(Some(raw)),
            Message::Binary(data) => return Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Message::Ping(data) => {
                if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                    tracing::debug!("failed to send pong: {}", e);
                }
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Drive the registration handshake for a fresh connection.
///
/// On success returns the granted role, a clone of the registered handle
/// (held so the delivery channel outlives displacement), and the receiving
/// half of the delivery queue. Protocol rejections send an `error` envelope
/// before returning `Err`; every error path leaves nothing registered, so
/// the caller must not unregister.
async fn await_register(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    state: &ServerState,
) -> Result<Option<(Role, ConnHandle, mpsc::Receiver<Envelope>)>, HubError> {
    let Some(raw) = next_frame(ws_tx, ws_rx).await? else {
        return Ok(None);
    };

    let envelope = match Envelope::decode(&raw) {
        Ok(envelope) => envelope,
        Err(e) => return reject(ws_tx, HubError::Decode(e)).await,
    };

    let Envelope::Register { role, token } = envelope else {
        return reject(ws_tx, HubError::RegisterExpected).await;
    };

    let Some(role) = role.as_deref().and_then(|r| r.parse::<Role>().ok()) else {
        return reject(ws_tx, HubError::InvalidRole).await;
    };

    let (deliver_tx, deliver_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
    let handle = ConnHandle { tx: deliver_tx };

    let ack = match state
        .registry
        .register(role, handle.clone(), token.as_deref())
    {
        Ok(ack) => ack,
        Err(e) => return reject(ws_tx, e).await,
    };

    // The role is committed; losing the peer before the ack lands must roll
    // the registration back like any later disconnect would.
    if let Err(e) = send_envelope(ws_tx, &ack).await {
        state.registry.unregister(role);
        return Err(e);
    }
    counters::registrations_total("accepted");
    tracing::debug!(%role, "connection registered");
    Ok(Some((role, handle, deliver_rx)))
}

/// Dispatch one inbound envelope from a registered connection.
///
/// Routing rejections are reported to the sender as `error` envelopes and
/// the session continues; only a failed send on the sender's own socket is
/// an error here.
async fn process_envelope(
    envelope: Envelope,
    role: Role,
    state: &ServerState,
    ws_tx: &mut WsSink,
) -> Result<(), HubError> {
    match envelope {
        Envelope::Command { command } if role == Role::B => {
            state.registry.notify_c(Envelope::command(command));
            counters::commands_relayed_total();
        }
        Envelope::Message { to, payload, .. } => {
            let target = to.as_deref().and_then(|t| t.parse::<Role>().ok());
            match target {
                Some(target @ (Role::A | Role::B)) => {
                    state
                        .registry
                        .forward(target, Envelope::message_from(role, payload));
                    counters::messages_relayed_total();
                }
                _ => send_envelope(ws_tx, &Envelope::error("invalid target")).await?,
            }
        }
        _ => send_envelope(ws_tx, &Envelope::error("unsupported message")).await?,
    }
    Ok(())
}

/// Decode and dispatch one data frame.
///
/// A decode failure is reported to the sender and terminates the session —
/// even after a successful registration.
async fn relay_frame(
    raw: &str,
    role: Role,
    state: &ServerState,
    ws_tx: &mut WsSink,
) -> Result<(), HubError> {
    let start = Instant::now();
    match Envelope::decode(raw) {
        Ok(envelope) => {
            process_envelope(envelope, role, state, ws_tx).await?;
            histograms::relay_latency_seconds(start.elapsed().as_secs_f64());
            Ok(())
        }
        Err(e) => {
            let err = HubError::Decode(e);
            let _ = send_envelope(ws_tx, &Envelope::error(err.to_string())).await;
            Err(err)
        }
    }
}

/// Drive the relay loop for a registered connection until the stream ends.
async fn run_message_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<Envelope>,
    role: Role,
    state: &ServerState,
) -> Result<(), HubError> {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(raw))) => {
                        relay_frame(&raw, role, state, ws_tx).await?;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let raw = String::from_utf8_lossy(&data).into_owned();
                        relay_frame(&raw, role, state, ws_tx).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(HubError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(envelope) = deliver_rx.recv() => {
                send_envelope(ws_tx, &envelope).await?;
            }
        }
    }
}

/// Accept the WebSocket handshake and drive one connection to completion.
///
/// # Errors
///
/// Returns an error when the session ends for any reason other than a clean
/// close by the peer; the accept loop logs it at debug level.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), HubError> {
    state.active_connections.fetch_add(1, Ordering::Relaxed);
    let _guard = ConnGuard {
        state: Arc::clone(&state),
    };

    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(HubError::WebSocket)?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let Some((role, _handle, mut deliver_rx)) =
        await_register(&mut ws_tx, &mut ws_rx, &state).await?
    else {
        tracing::debug!(peer = %peer_addr, "closed before registering");
        return Ok(());
    };

    gauges::inc_connections_active();
    let result = run_message_loop(&mut ws_tx, &mut ws_rx, &mut deliver_rx, role, &state).await;
    gauges::dec_connections_active();

    // Always runs, whatever ended the loop. A displaced session evicts its
    // replacement here; the original behaves the same way.
    state.registry.unregister(role);
    tracing::debug!(%role, peer = %peer_addr, "connection unregistered");

    result
}
