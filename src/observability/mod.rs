//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions and the datagram loop produce:
//!     → recorder.rs (one EchoEvent per echoed payload)
//!     → metrics.rs (counters, gauges)
//!     → logging.rs (structured tracing events, per-session spans)
//!
//! Consumers:
//!     → Log output (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Recording is fire-and-forget: a recorder never blocks or fails a session
//! - Every session runs inside a span carrying its id, endpoint and peer
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod recorder;

pub use recorder::{EchoEvent, MemoryRecorder, RecordedEcho, Recorder, TracingRecorder, Transport};
