//! HTTP/1.1 echo session.
//!
//! ```text
//! AWAIT_REQUEST ──head + body──▶ RESPOND ──keep-alive──▶ AWAIT_REQUEST
//!       │                           │
//!       └── EOF / reset ──▶ CLOSED ◀┘ close requested
//! ```
//!
//! Malformed framing ends the session without a response.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::request::{parse_head, BodyFraming, ChunkedDecoder, HeadStatus, RequestHead};
use crate::http::response::{EchoResponse, CONTINUE};
use crate::http::websocket;
use crate::observability::Transport;
use crate::resilience::within;
use crate::session::{is_disconnect, Peer, SessionContext, SessionError};

const READ_RESERVE: usize = 4096;

/// A byte stream plus the bytes read from it but not yet consumed.
pub struct HttpConnection<S> {
    stream: S,
    buf: BytesMut,
    out: BytesMut,
}

impl<S> HttpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `buffered` is input already read from `stream` (e.g. while sniffing).
    pub fn new(stream: S, buffered: BytesMut) -> Self {
        Self {
            stream,
            buf: buffered,
            out: BytesMut::new(),
        }
    }

    pub fn into_parts(self) -> (S, BytesMut) {
        (self.stream, self.buf)
    }

    async fn fill(&mut self, ctx: &SessionContext, waiting_for: &'static str) -> Result<usize, SessionError> {
        self.buf.reserve(READ_RESERVE);
        match within(ctx.timeouts.idle(), self.stream.read_buf(&mut self.buf)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(SessionError::TimedOut(waiting_for)),
        }
    }

    /// Read the next request head.
    ///
    /// `Ok(None)` when the peer closed or reset between requests.
    pub async fn read_head(&mut self, ctx: &SessionContext) -> Result<Option<RequestHead>, SessionError> {
        loop {
            if !self.buf.is_empty() {
                if let HeadStatus::Complete(head) = parse_head(&self.buf, &ctx.limits)? {
                    self.buf.advance(head.head_len);
                    return Ok(Some(head));
                }
            }
            match self.fill(ctx, "request").await {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(SessionError::Io(e)) if is_disconnect(&e) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the body that follows `head`.
    pub async fn read_body(&mut self, head: &RequestHead, ctx: &SessionContext) -> Result<Bytes, SessionError> {
        let framing = head.framing(&ctx.limits)?;
        if framing != BodyFraming::Empty && head.expects_continue() && self.buf.is_empty() {
            self.stream.write_all(CONTINUE).await?;
            self.stream.flush().await?;
        }

        match framing {
            BodyFraming::Empty => Ok(Bytes::new()),
            BodyFraming::Length(len) => {
                while self.buf.len() < len {
                    if self.fill(ctx, "request body").await? == 0 {
                        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                    }
                }
                Ok(self.buf.split_to(len).freeze())
            }
            BodyFraming::Chunked => {
                let mut decoder = ChunkedDecoder::new(&ctx.limits);
                loop {
                    if let Some(body) = decoder.decode(&mut self.buf)? {
                        return Ok(body);
                    }
                    if self.fill(ctx, "request body").await? == 0 {
                        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                    }
                }
            }
        }
    }

    pub async fn write_response(&mut self, response: &EchoResponse, server: &str) -> Result<(), SessionError> {
        self.out.clear();
        response.encode(server, &mut self.out);
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write side after the final response.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "Shutdown after final response failed");
        }
    }
}

/// Serve requests on `conn`, starting with the already-parsed `first` head.
pub async fn run<S>(
    mut conn: HttpConnection<S>,
    first: RequestHead,
    ctx: &SessionContext,
    peer: Peer,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut pending = Some(first);
    let mut served: u64 = 0;

    loop {
        let head = match pending.take() {
            Some(head) => head,
            None => match conn.read_head(ctx).await? {
                Some(head) => head,
                None => break,
            },
        };

        if websocket::is_upgrade_request(&head)? {
            let (stream, buffered) = conn.into_parts();
            return websocket::accept(stream, &head, buffered, ctx, peer).await;
        }

        let body = conn.read_body(&head, ctx).await?;
        let request = head.into_request(body);
        tracing::debug!(
            method = %request.method,
            target = %request.target,
            version = ?request.version,
            bytes = request.body.len(),
            keep_alive = request.keep_alive,
            "HTTP request"
        );

        ctx.record(Transport::Http, &peer, &request.body);
        let response = EchoResponse::for_request(&request);
        conn.write_response(&response, &ctx.server_header).await?;
        served += 1;

        if !response.keep_alive {
            conn.close().await;
            break;
        }
    }

    tracing::debug!(requests = served, "HTTP session finished");
    Ok(())
}
