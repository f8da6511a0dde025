//! Multi-transport echo server library.
//!
//! Every payload received is sent back, unchanged, to whoever sent it:
//! raw TCP byte streams, UDP datagrams, HTTP/1.1 request bodies and
//! WebSocket messages, optionally over TLS.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod server;
pub mod session;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::EchoConfig;
pub use lifecycle::Shutdown;
pub use server::{EchoServer, StartupError};
