//! Error types for the socket endpoint
//!
//! One enum per failure boundary: handshake, frame decoding, outbound
//! queueing and stream I/O. Uses thiserror for ergonomic error definitions.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Handshake/upgrade failure (fatal, the connection never starts)
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The origin policy refused the request (peer received HTTP 403)
    #[error("Origin rejected")]
    OriginRejected,

    /// WebSocket handshake failed (protocol mismatch, bad request, ...)
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] WsError),

    /// IO error while accepting the stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single inbound frame could not be turned into an event
///
/// Recovered locally by the reader loop: logged, then the frame is skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not a JSON envelope
    #[error("JSON envelope error: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope has an empty event name
    #[error("Envelope has no event name")]
    MissingName,
}

/// Outbound queue errors
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection is closing or the writer has exited
    #[error("Channel closed")]
    ChannelClosed,

    /// Queue is at capacity (only returned by non-blocking sends)
    #[error("Outbound queue full")]
    Full,

    /// Envelope could not be serialized
    #[error("Envelope encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// I/O failure on the underlying stream
///
/// Fatal to the loop that observed it. Reported in the loop's exit reason.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("read failed: {0}")]
    Read(WsError),

    #[error("write failed: {0}")]
    Write(WsError),

    #[error("no frame received within {0:?}")]
    ReadTimeout(Duration),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
}

impl StreamError {
    /// Whether this error is a normal way for a peer to go away
    ///
    /// Connection resets and missing close handshakes happen whenever a
    /// client tab is closed, so they are only logged at debug level.
    pub fn is_expected_close(&self) -> bool {
        match self {
            StreamError::Read(e) | StreamError::Write(e) => is_expected_ws_close(e),
            StreamError::ReadTimeout(_) | StreamError::WriteTimeout(_) => false,
        }
    }
}

fn is_expected_ws_close(err: &WsError) -> bool {
    use std::io::ErrorKind;
    use tokio_tungstenite::tungstenite::error::ProtocolError;

    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

/// Binary-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Connection could not be upgraded
    #[error("Upgrade error: {0}")]
    Upgrade(#[from] UpgradeError),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
