//! Echo event recording.
//!
//! Sessions report every payload they echo through a [`Recorder`]. The
//! production recorder writes a structured log line; [`MemoryRecorder`]
//! keeps events for inspection when the server is embedded in tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Transport an echoed payload arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Udp,
    Http,
    WebSocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Http => "http",
            Transport::WebSocket => "websocket",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One received-and-echoed payload.
#[derive(Debug, Clone, Copy)]
pub struct EchoEvent<'a> {
    pub transport: Transport,
    pub peer: SocketAddr,
    /// Whether the payload travelled inside a TLS session.
    pub tls: bool,
    pub payload: &'a [u8],
}

impl EchoEvent<'_> {
    pub fn byte_count(&self) -> usize {
        self.payload.len()
    }
}

/// Sink for echo events.
///
/// Implementations must return quickly and must not fail; they are called
/// inline from the session loop.
pub trait Recorder: Send + Sync {
    fn record(&self, event: &EchoEvent<'_>);
}

/// Logs each event at `info` with a truncated, lossy UTF-8 preview of the payload.
#[derive(Debug, Clone)]
pub struct TracingRecorder {
    preview_len: usize,
}

impl TracingRecorder {
    pub fn new(preview_len: usize) -> Self {
        Self { preview_len }
    }
}

impl Default for TracingRecorder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Recorder for TracingRecorder {
    fn record(&self, event: &EchoEvent<'_>) {
        tracing::info!(
            transport = %event.transport,
            peer = %event.peer,
            tls = event.tls,
            bytes = event.byte_count(),
            payload = %preview(event.payload, self.preview_len),
            "Echoed"
        );
    }
}

fn preview(payload: &[u8], max: usize) -> String {
    let cut = payload.len().min(max);
    let mut text = String::from_utf8_lossy(&payload[..cut]).into_owned();
    if cut < payload.len() {
        text.push('…');
    }
    text
}

/// An owned copy of an [`EchoEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEcho {
    pub transport: Transport,
    pub peer: SocketAddr,
    pub tls: bool,
    pub payload: Vec<u8>,
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<RecordedEcho>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<RecordedEcho> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded events for one transport.
    pub fn for_transport(&self, transport: Transport) -> Vec<RecordedEcho> {
        self.events()
            .into_iter()
            .filter(|e| e.transport == transport)
            .collect()
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, event: &EchoEvent<'_>) {
        let owned = RecordedEcho {
            transport: event.transport,
            peer: event.peer,
            tls: event.tls,
            payload: event.payload.to_vec(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(owned),
            Err(poisoned) => poisoned.into_inner().push(owned),
        }
    }
}
