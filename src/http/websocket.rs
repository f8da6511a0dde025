//! WebSocket upgrade and echo session.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Complete the upgrade handshake (101 Switching Protocols)
//! - Echo every text/binary message with its type preserved
//!
//! # Data Flow
//! ```text
//! Client ──── WebSocket frames ───▶ Echo server
//!        ◀─── same message, same type ─┘
//! ```
//!
//! # Design Decisions
//! - Bytes the client sent after the upgrade request are replayed into the
//!   frame reader, never dropped
//! - Ping/pong handled by tungstenite; a peer close is answered with a close
//! - A request that names `Upgrade: websocket` but fails the other checks is a
//!   protocol error, not a plain HTTP request

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use http::header;
use http::{Method, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::http::request::{has_token, RequestHead};
use crate::http::response::switching_protocols;
use crate::net::Rewind;
use crate::observability::Transport;
use crate::resilience::within;
use crate::session::{Peer, ProtocolError, SessionContext, SessionError};

/// Decide whether `head` asks for a WebSocket upgrade.
///
/// `Ok(false)` for ordinary requests; an error for broken upgrade attempts.
pub fn is_upgrade_request(head: &RequestHead) -> Result<bool, ProtocolError> {
    if !has_token(&head.headers, &header::UPGRADE, "websocket") {
        return Ok(false);
    }
    if head.method != Method::GET {
        return Err(ProtocolError::BadUpgrade("method must be GET"));
    }
    if head.version != Version::HTTP_11 {
        return Err(ProtocolError::BadUpgrade("version must be HTTP/1.1"));
    }
    if !has_token(&head.headers, &header::CONNECTION, "upgrade") {
        return Err(ProtocolError::BadUpgrade("Connection header lacks upgrade"));
    }
    match head.headers.get(header::SEC_WEBSOCKET_VERSION) {
        Some(v) if v == "13" => {}
        _ => return Err(ProtocolError::BadUpgrade("unsupported Sec-WebSocket-Version")),
    }
    if !head.headers.contains_key(header::SEC_WEBSOCKET_KEY) {
        return Err(ProtocolError::BadUpgrade("missing Sec-WebSocket-Key"));
    }
    Ok(true)
}

/// Answer a validated upgrade request and run the echo session.
///
/// `buffered` holds bytes read past the request head; they are the start of
/// the frame stream.
pub async fn accept<S>(
    mut stream: S,
    head: &RequestHead,
    buffered: BytesMut,
    ctx: &SessionContext,
    peer: Peer,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = head
        .headers
        .get(header::SEC_WEBSOCKET_KEY)
        .ok_or(ProtocolError::BadUpgrade("missing Sec-WebSocket-Key"))?;
    let accept_key = derive_accept_key(key.as_bytes());

    stream
        .write_all(&switching_protocols(&ctx.server_header, &accept_key))
        .await?;
    stream.flush().await?;
    tracing::debug!(target = %head.target, "WebSocket upgrade complete");

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(ctx.limits.max_body_bytes);
    config.max_frame_size = Some(ctx.limits.max_body_bytes);

    let socket = WebSocketStream::from_raw_socket(
        Rewind::new(buffered.freeze(), stream),
        Role::Server,
        Some(config),
    )
    .await;
    serve(socket, ctx, peer).await
}

/// Echo messages until the peer closes.
pub async fn serve<S>(
    mut socket: WebSocketStream<S>,
    ctx: &SessionContext,
    peer: Peer,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut echoed: u64 = 0;

    loop {
        let next = within(ctx.timeouts.idle(), socket.next())
            .await
            .map_err(|_| SessionError::TimedOut("message"))?;
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                let e = SessionError::from(e);
                if e.is_expected() {
                    tracing::debug!(reason = %e, "WebSocket stream ended");
                    break;
                }
                return Err(e);
            }
            None => break,
        };

        match message {
            Message::Text(_) | Message::Binary(_) => {
                ctx.record(Transport::WebSocket, &peer, payload(&message));
                socket.send(message).await?;
                echoed += 1;
            }
            Message::Close(frame) => {
                // tungstenite has queued the close reply; the next poll flushes it
                // and then reports end of stream.
                tracing::debug!(?frame, "Peer closed WebSocket");
            }
            _ => {}
        }
    }

    tracing::debug!(messages = echoed, "WebSocket session finished");
    Ok(())
}

fn payload(message: &Message) -> &[u8] {
    match message {
        Message::Text(text) => text.as_bytes(),
        Message::Binary(data) => data.as_ref(),
        _ => &[],
    }
}
