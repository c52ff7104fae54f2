use thiserror::Error;
use trio_common::DecodeError;

/// Errors that can occur during relay hub operation.
///
/// The `Display` text of the protocol-rejection variants is exactly what is
/// sent back to the peer in an `error` envelope.
#[derive(Error, Debug)]
pub enum HubError {
    /// A connection's first envelope was something other than `register`.
    #[error("first message must register")]
    RegisterExpected,
    /// The requested role is not one of "a", "b", "c".
    #[error("invalid role")]
    InvalidRole,
    /// The presented token is not in the accepted set for role "b".
    #[error("invalid token")]
    InvalidToken,
    /// The inbound frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// An outbound envelope failed to serialize.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
