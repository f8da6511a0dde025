//! State shared by every session, and the session error taxonomy.
//!
//! A session ends in one of three ways:
//! - expected termination (EOF, reset, peer close): `Ok(())` or an error for
//!   which [`SessionError::is_expected`] is true
//! - protocol error: the offending connection is closed without a response
//! - I/O or timeout error: the offending connection is closed
//!
//! Errors never leave the task that owns the connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::config::{EchoConfig, LimitsConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::observability::{EchoEvent, Recorder, Transport};

/// Immutable per-server state handed to every session.
pub struct SessionContext {
    recorder: Arc<dyn Recorder>,
    pub timeouts: TimeoutConfig,
    pub limits: LimitsConfig,
    pub server_header: String,
}

impl SessionContext {
    pub fn new(config: &EchoConfig, recorder: Arc<dyn Recorder>) -> Self {
        Self {
            recorder,
            timeouts: config.timeouts.clone(),
            limits: config.limits.clone(),
            server_header: config.http.server_header.clone(),
        }
    }

    /// Report a payload that is about to be echoed.
    pub fn record(&self, transport: Transport, peer: &Peer, payload: &[u8]) {
        self.recorder.record(&EchoEvent {
            transport,
            peer: peer.addr,
            tls: peer.tls,
            payload,
        });
        metrics::record_echo(transport, payload.len());
    }
}

/// The remote end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub addr: SocketAddr,
    pub tls: bool,
}

/// Framing violations that end a session without a response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request head: {0}")]
    MalformedHead(String),

    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("too many request headers")]
    TooManyHeaders,

    #[error("invalid or conflicting Content-Length")]
    BadContentLength,

    #[error("unsupported Transfer-Encoding")]
    BadTransferEncoding,

    #[error("malformed chunked body")]
    BadChunk,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("stream does not start with an HTTP request")]
    NotHttp,

    #[error("invalid WebSocket upgrade: {0}")]
    BadUpgrade(&'static str),
}

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    #[error("timed out waiting for {0}")]
    TimedOut(&'static str),
}

impl SessionError {
    /// True for the ways a peer normally leaves: EOF, reset, or a completed close.
    pub fn is_expected(&self) -> bool {
        match self {
            SessionError::Io(e) => is_disconnect(e),
            SessionError::WebSocket(e) => match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
                tungstenite::Error::Protocol(
                    tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
                ) => true,
                tungstenite::Error::Io(e) => is_disconnect(e),
                _ => false,
            },
            _ => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Io(_) => "io",
            SessionError::Protocol(_) => "protocol",
            SessionError::WebSocket(_) => "websocket",
            SessionError::Handshake(_) => "handshake",
            SessionError::TimedOut(_) => "timeout",
        }
    }
}

/// I/O errors that mean the peer went away rather than something broke.
pub fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Log how a session ended. Called once, at the task boundary.
pub fn log_outcome(result: Result<(), SessionError>) {
    match result {
        Ok(()) => tracing::debug!("Session closed"),
        Err(e) if e.is_expected() => tracing::debug!(reason = %e, "Session closed by peer"),
        Err(e) => {
            metrics::record_session_error(e.kind());
            tracing::warn!(error = %e, kind = e.kind(), "Session ended with error");
        }
    }
}
