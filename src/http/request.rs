//! Request head parsing and body framing.
//!
//! # Responsibilities
//! - Parse request line and headers (httparse) into owned types
//! - Enforce head size and header count limits
//! - Decide body framing (Content-Length, chunked, none)
//! - Decode chunked bodies incrementally
//!
//! # Design Decisions
//! - Conflicting or ambiguous framing is a protocol error, never guessed
//! - Limits checked before the body is buffered

use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Version};

use crate::config::LimitsConfig;
use crate::session::ProtocolError;

/// A parsed request line and header block.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    /// Bytes the head occupied in the input buffer.
    pub head_len: usize,
}

/// A complete request, body included.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub keep_alive: bool,
}

/// Outcome of a head parse attempt.
#[derive(Debug)]
pub enum HeadStatus {
    Complete(RequestHead),
    /// More bytes are needed.
    Partial,
}

/// Parse a request head from the start of `buf`.
pub fn parse_head(buf: &[u8], limits: &LimitsConfig) -> Result<HeadStatus, ProtocolError> {
    let mut slots = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut req = httparse::Request::new(&mut slots);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() > limits.max_head_bytes {
                return Err(ProtocolError::HeadTooLarge(limits.max_head_bytes));
            }
            return Ok(HeadStatus::Partial);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ProtocolError::TooManyHeaders),
        Err(e) => return Err(ProtocolError::MalformedHead(e.to_string())),
    };
    if head_len > limits.max_head_bytes {
        return Err(ProtocolError::HeadTooLarge(limits.max_head_bytes));
    }

    let malformed = |what: &str| ProtocolError::MalformedHead(what.to_string());

    let method = req
        .method
        .ok_or_else(|| malformed("missing method"))
        .and_then(|m| Method::from_bytes(m.as_bytes()).map_err(|_| malformed("invalid method")))?;
    let target = req.path.ok_or_else(|| malformed("missing target"))?.to_string();
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(malformed("unsupported version")),
    };

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| malformed("invalid header name"))?;
        let value = HeaderValue::from_bytes(h.value).map_err(|_| malformed("invalid header value"))?;
        headers.append(name, value);
    }

    Ok(HeadStatus::Complete(RequestHead {
        method,
        target,
        version,
        headers,
        head_len,
    }))
}

/// True if any comma-separated element of any `name` header equals `token`
/// (ASCII case-insensitive).
pub fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

impl RequestHead {
    /// Whether the connection may carry another request after this one.
    ///
    /// `Connection: close` wins, then `Connection: keep-alive`; otherwise
    /// HTTP/1.1 defaults to persistent and HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        if has_token(&self.headers, &header::CONNECTION, "close") {
            false
        } else if has_token(&self.headers, &header::CONNECTION, "keep-alive") {
            true
        } else {
            self.version == Version::HTTP_11
        }
    }

    /// Client asked for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.version == Version::HTTP_11 && has_token(&self.headers, &header::EXPECT, "100-continue")
    }

    pub fn framing(&self, limits: &LimitsConfig) -> Result<BodyFraming, ProtocolError> {
        let transfer_encoding = self.headers.contains_key(header::TRANSFER_ENCODING);
        let content_length = self.headers.contains_key(header::CONTENT_LENGTH);

        if transfer_encoding {
            if content_length {
                return Err(ProtocolError::BadContentLength);
            }
            let last = self
                .headers
                .get_all(header::TRANSFER_ENCODING)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .last();
            return match last {
                Some(coding) if coding.eq_ignore_ascii_case("chunked") => Ok(BodyFraming::Chunked),
                _ => Err(ProtocolError::BadTransferEncoding),
            };
        }

        if !content_length {
            return Ok(BodyFraming::Empty);
        }

        let mut length: Option<usize> = None;
        for value in self.headers.get_all(header::CONTENT_LENGTH) {
            let text = value.to_str().map_err(|_| ProtocolError::BadContentLength)?;
            for part in text.split(',') {
                let part = part.trim();
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ProtocolError::BadContentLength);
                }
                let parsed: usize = part.parse().map_err(|_| ProtocolError::BadContentLength)?;
                match length {
                    Some(existing) if existing != parsed => {
                        return Err(ProtocolError::BadContentLength)
                    }
                    _ => length = Some(parsed),
                }
            }
        }

        match length {
            Some(0) => Ok(BodyFraming::Empty),
            Some(n) if n > limits.max_body_bytes => {
                Err(ProtocolError::BodyTooLarge(limits.max_body_bytes))
            }
            Some(n) => Ok(BodyFraming::Length(n)),
            None => Err(ProtocolError::BadContentLength),
        }
    }

    pub fn into_request(self, body: Bytes) -> EchoRequest {
        let keep_alive = self.keep_alive();
        EchoRequest {
            method: self.method,
            target: self.target,
            version: self.version,
            headers: self.headers,
            body,
            keep_alive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
}

/// Incremental `Transfer-Encoding: chunked` decoder.
///
/// Consumes framing from the front of the input buffer and leaves any bytes
/// after the terminating empty line (a pipelined request) untouched.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    body: BytesMut,
    max_body: usize,
    max_line: usize,
}

impl ChunkedDecoder {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            state: ChunkState::Size,
            body: BytesMut::new(),
            max_body: limits.max_body_bytes,
            max_line: limits.max_head_bytes,
        }
    }

    /// Decode as much as `buf` allows. Returns the body once the final chunk
    /// and trailer section have been consumed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            match self.state {
                ChunkState::Size => match httparse::parse_chunk_size(&buf[..]) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        buf.advance(consumed);
                        let size = usize::try_from(size).map_err(|_| ProtocolError::BadChunk)?;
                        if size == 0 {
                            self.state = ChunkState::Trailer;
                        } else if self.body.len().saturating_add(size) > self.max_body {
                            return Err(ProtocolError::BodyTooLarge(self.max_body));
                        } else {
                            self.state = ChunkState::Data(size);
                        }
                    }
                    Ok(httparse::Status::Partial) => return self.need_more(buf),
                    Err(_) => return Err(ProtocolError::BadChunk),
                },
                ChunkState::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let n = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf.split_to(n));
                    self.state = if n == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(remaining - n)
                    };
                }
                ChunkState::DataEnd => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ProtocolError::BadChunk);
                    }
                    buf.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => match buf.iter().position(|&b| b == b'\n') {
                    Some(end) => {
                        let blank = end == 0 || (end == 1 && buf[0] == b'\r');
                        buf.advance(end + 1);
                        if blank {
                            return Ok(Some(self.body.split().freeze()));
                        }
                    }
                    None => return self.need_more(buf),
                },
            }
        }
    }

    fn need_more(&self, buf: &BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if buf.len() > self.max_line {
            Err(ProtocolError::BadChunk)
        } else {
            Ok(None)
        }
    }
}
