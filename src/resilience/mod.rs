//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Every suspension point of a session:
//!     → timeouts.rs (sniff deadline, TLS handshake deadline, idle deadline)
//!     → on expiry the session ends with a distinct timeout error
//! ```
//!
//! # Design Decisions
//! - Deadlines are configurable and individually switchable off
//! - No retries: a failed read or write ends the session

pub mod timeouts;

pub use timeouts::within;
