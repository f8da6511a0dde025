//! Classify a fresh stream as HTTP or raw by reading ahead.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::config::SessionMode;
use crate::http::request::{parse_head, HeadStatus, RequestHead};
use crate::resilience::within;
use crate::session::{is_disconnect, ProtocolError, SessionContext, SessionError};

const READ_RESERVE: usize = 4096;

/// What the leading bytes of a stream turned out to be.
#[derive(Debug)]
pub enum Sniffed {
    /// The peer left before sending anything usable.
    Empty,
    /// Not HTTP. Holds every byte read so far.
    Raw(BytesMut),
    /// A complete request head, plus bytes read past it.
    Http { head: RequestHead, buffered: BytesMut },
}

/// False once `buf` can no longer be the start of an HTTP request line.
///
/// Leading empty lines are allowed. After them must come a method token
/// (RFC 9110 `tchar`s) followed by a space.
pub fn could_be_http(buf: &[u8]) -> bool {
    let start = buf
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .unwrap_or(buf.len());
    let line = &buf[start..];
    match line.iter().position(|&b| !is_tchar(b)) {
        None => true,
        Some(0) => false,
        Some(end) => line[end] == b' ',
    }
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Read from `stream` until its protocol is known.
///
/// In [`SessionMode::Sniff`] anything that is not HTTP becomes
/// [`Sniffed::Raw`], and a head that stalls past the sniff deadline counts as
/// not HTTP. In [`SessionMode::Http`] only the parser decides, every read
/// waits up to the idle timeout, and a malformed head is a protocol error.
pub async fn sniff<S>(
    stream: &mut S,
    mode: SessionMode,
    ctx: &SessionContext,
) -> Result<Sniffed, SessionError>
where
    S: AsyncRead + Unpin,
{
    let fallback = mode == SessionMode::Sniff;
    let not_http = |buf: BytesMut, err: ProtocolError| {
        if fallback {
            Ok(Sniffed::Raw(buf))
        } else {
            Err(SessionError::from(err))
        }
    };

    let mut buf = BytesMut::with_capacity(READ_RESERVE);
    let mut deadline: Option<Instant> = None;

    loop {
        if !buf.is_empty() {
            if fallback && !could_be_http(&buf) {
                return not_http(buf, ProtocolError::NotHttp);
            }
            match parse_head(&buf, &ctx.limits) {
                Ok(HeadStatus::Complete(head)) => {
                    buf.advance(head.head_len);
                    return Ok(Sniffed::Http {
                        head,
                        buffered: buf,
                    });
                }
                Ok(HeadStatus::Partial) => {}
                Err(e) => return not_http(buf, e),
            }
            if fallback && deadline.is_none() {
                deadline = ctx.timeouts.sniff().map(|limit| Instant::now() + limit);
            }
        }

        let limit = match deadline {
            Some(at) => Some(at.saturating_duration_since(Instant::now())),
            None => ctx.timeouts.idle(),
        };

        buf.reserve(READ_RESERVE);
        let read = match within(limit, stream.read_buf(&mut buf)).await {
            Ok(read) => read,
            Err(_) if deadline.is_some() => {
                tracing::debug!(buffered = buf.len(), "Sniff deadline expired");
                return not_http(buf, ProtocolError::NotHttp);
            }
            Err(_) => return Err(SessionError::TimedOut("first request")),
        };

        match read {
            Ok(0) if buf.is_empty() || !fallback => return Ok(Sniffed::Empty),
            Ok(0) => return Ok(Sniffed::Raw(buf)),
            Ok(_) => {}
            Err(e) if is_disconnect(&e) => return Ok(Sniffed::Empty),
            Err(e) => return Err(e.into()),
        }
    }
}
