//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Sniffed stream + first request head
//!     → session.rs (request loop, keep-alive)
//!     → request.rs (head parsing, body framing, chunked decoding)
//!     → response.rs (echo response serialization)
//!     → Send to client
//!
//! Upgrade request
//!     → websocket.rs (101 handshake, message echo)
//! ```

pub mod request;
pub mod response;
pub mod session;
pub mod websocket;

pub use request::{EchoRequest, RequestHead};
pub use response::EchoResponse;
pub use session::HttpConnection;
