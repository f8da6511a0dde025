//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (session id, active-session tracking)
//!     → routing (protocol sniffing) → raw.rs / http / websocket
//!
//! Incoming UDP datagram
//!     → datagram.rs (stateless receive → reply)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection owned by exactly one task for its whole life
//! - TLS is a stream decorator; nothing downstream knows about it

pub mod connection;
pub mod datagram;
pub mod listener;
pub mod raw;
pub mod rewind;
pub mod tls;

use tokio::io::{AsyncRead, AsyncWrite};

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use listener::{Listener, ListenerError};
pub use rewind::Rewind;

/// Any byte stream a session can own: plain TCP, TLS over TCP, or a replaying wrapper.
pub trait EchoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> EchoStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}
