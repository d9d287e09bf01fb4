//! HTTP -> WebSocket upgrade
//!
//! Runs the server side of the handshake on an accepted byte stream,
//! applying the buffer sizes and origin policy from [`UpgradeConfig`].

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, warn};

use crate::config::UpgradeConfig;
use crate::error::UpgradeError;

/// Perform the WebSocket handshake on `stream`
///
/// Requests refused by the origin policy are answered with 403 Forbidden and
/// reported as [`UpgradeError::OriginRejected`].
pub async fn accept<S>(stream: S, config: &UpgradeConfig) -> Result<WebSocketStream<S>, UpgradeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ws_config = WebSocketConfig::default();
    ws_config.read_buffer_size = config.read_buffer_size;
    ws_config.write_buffer_size = config.write_buffer_size;

    let policy = Arc::clone(&config.allow_origin);
    let check_origin = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if policy(req) {
            return Ok(resp);
        }
        let origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<none>");
        warn!("Rejecting upgrade from origin {}", origin);

        let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
        *rejection.status_mut() = StatusCode::FORBIDDEN;
        Err(rejection)
    };

    match accept_hdr_async_with_config(stream, check_origin, Some(ws_config)).await {
        Ok(ws_stream) => {
            debug!("WebSocket handshake completed");
            Ok(ws_stream)
        }
        Err(WsError::Http(resp)) if resp.status() == StatusCode::FORBIDDEN => {
            Err(UpgradeError::OriginRejected)
        }
        Err(e) => Err(e.into()),
    }
}
