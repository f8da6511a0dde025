//! Protocol routing subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted stream (TCP or TLS)
//!     → sniff.rs (buffer leading bytes, try to parse an HTTP head)
//!     → router.rs (dispatch)
//!         ├─ not HTTP      → raw echo over Rewind(buffered bytes)
//!         ├─ upgrade       → WebSocket handshake + echo
//!         └─ HTTP request  → HTTP session seeded with the parsed head
//! ```
//!
//! # Design Decisions
//! - Every byte read while probing is handed to the session that wins
//! - Obvious non-HTTP input is classified on the first byte, no waiting
//! - The sniff deadline starts at the first byte; silence before that is
//!   governed by the idle timeout

pub mod router;
pub mod sniff;

pub use router::route;
pub use sniff::{could_be_http, sniff, Sniffed};
