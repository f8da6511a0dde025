//! Response construction and serialization.
//!
//! # Responsibilities
//! - Build the echo response for a request (200, text/plain, same body)
//! - Mirror the request's version and keep-alive preference
//! - Serialize heads for the interim and upgrade responses
//!
//! # Design Decisions
//! - Responses are written by hand; there is exactly one response shape
//! - `HEAD` gets the same headers as `GET` and no body bytes

use bytes::{BufMut, Bytes, BytesMut};
use http::{Method, Version};

use crate::http::request::EchoRequest;

/// Interim response sent when a client waits on `Expect: 100-continue`.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// The response to one echo request.
#[derive(Debug, Clone)]
pub struct EchoResponse {
    pub version: Version,
    pub keep_alive: bool,
    pub body: Bytes,
    /// Suppress body bytes (response to `HEAD`).
    pub head_only: bool,
}

impl EchoResponse {
    pub fn for_request(request: &EchoRequest) -> Self {
        Self {
            version: request.version,
            keep_alive: request.keep_alive,
            body: request.body.clone(),
            head_only: request.method == Method::HEAD,
        }
    }

    /// Serialize into `dst`.
    pub fn encode(&self, server: &str, dst: &mut BytesMut) {
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        let head = format!(
            "{} 200 OK\r\nServer: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
            version_str(self.version),
            server,
            self.body.len(),
            connection,
        );
        dst.reserve(head.len() + self.body.len());
        dst.put_slice(head.as_bytes());
        if !self.head_only {
            dst.put_slice(&self.body);
        }
    }
}

/// `101 Switching Protocols` head completing a WebSocket handshake.
pub fn switching_protocols(server: &str, accept_key: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 101 Switching Protocols\r\nServer: {server}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept_key}\r\n\r\n"
    ))
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}
