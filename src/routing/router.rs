//! Hand a freshly accepted stream to the session that owns its protocol.

use crate::config::SessionMode;
use crate::http::session::{self as http_session, HttpConnection};
use crate::http::websocket;
use crate::net::{raw, EchoStream, Rewind};
use crate::routing::sniff::{sniff, Sniffed};
use crate::session::{Peer, SessionContext, SessionError};

/// Run the session for `stream` to completion.
pub async fn route<S>(
    mut stream: S,
    mode: SessionMode,
    ctx: &SessionContext,
    peer: Peer,
) -> Result<(), SessionError>
where
    S: EchoStream,
{
    if mode == SessionMode::Raw {
        return raw::run(stream, ctx, peer).await;
    }

    match sniff(&mut stream, mode, ctx).await? {
        Sniffed::Empty => {
            tracing::debug!("Peer closed before sending a request");
            Ok(())
        }
        Sniffed::Raw(buffered) => {
            tracing::debug!(buffered = buffered.len(), "Not HTTP, echoing raw bytes");
            raw::run(Rewind::new(buffered.freeze(), stream), ctx, peer).await
        }
        Sniffed::Http { head, buffered } => {
            if websocket::is_upgrade_request(&head)? {
                websocket::accept(stream, &head, buffered, ctx, peer).await
            } else {
                http_session::run(HttpConnection::new(stream, buffered), head, ctx, peer).await
            }
        }
    }
}
