//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the echo server.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the echo server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EchoConfig {
    /// TCP endpoints (raw, HTTP, or sniffed).
    pub endpoints: Vec<EndpointConfig>,

    /// UDP endpoints.
    pub datagram: Vec<DatagramConfig>,

    /// Certificate material shared by every endpoint with `tls = true`.
    pub tls: Option<TlsConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Buffer and framing limits.
    pub limits: LimitsConfig,

    /// HTTP response policy.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                EndpointConfig::new("http", "0.0.0.0:8080", SessionMode::Http),
                EndpointConfig::new("tcp", "0.0.0.0:8081", SessionMode::Raw),
            ],
            datagram: vec![DatagramConfig::new("udp", "0.0.0.0:8082")],
            tls: None,
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            http: HttpConfig::default(),
            observability: ObservabilityConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl EchoConfig {
    /// Replace the port of the first TCP endpoint running in `mode`.
    ///
    /// Returns `false` when no such endpoint exists or its address does not parse.
    pub fn set_endpoint_port(&mut self, mode: SessionMode, port: u16) -> bool {
        match self.endpoints.iter_mut().find(|e| e.mode == mode) {
            Some(endpoint) => replace_port(&mut endpoint.bind_address, port),
            None => false,
        }
    }

    /// Replace the port of the first UDP endpoint.
    pub fn set_datagram_port(&mut self, port: u16) -> bool {
        match self.datagram.first_mut() {
            Some(datagram) => replace_port(&mut datagram.bind_address, port),
            None => false,
        }
    }
}

fn replace_port(address: &mut String, port: u16) -> bool {
    match address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            *address = addr.to_string();
            true
        }
        Err(_) => false,
    }
}

/// How an accepted TCP connection is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Byte-chunk echo, no protocol detection.
    Raw,
    /// HTTP echo with WebSocket upgrade; non-HTTP input closes the connection.
    Http,
    /// Combined port: HTTP and WebSocket when the stream looks like HTTP, raw echo otherwise.
    Sniff,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Raw => f.write_str("raw"),
            SessionMode::Http => f.write_str("http"),
            SessionMode::Sniff => f.write_str("sniff"),
        }
    }
}

/// TCP endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Endpoint identifier for logging.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Protocol handling for accepted connections.
    pub mode: SessionMode,

    /// Wrap every accepted connection in a TLS server handshake.
    pub tls: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl EndpointConfig {
    pub fn new(name: &str, bind_address: &str, mode: SessionMode) -> Self {
        Self {
            name: name.to_string(),
            bind_address: bind_address.to_string(),
            mode,
            ..Self::default()
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "tcp".to_string(),
            bind_address: "0.0.0.0:8081".to_string(),
            mode: SessionMode::Sniff,
            tls: false,
            max_connections: 10_000,
        }
    }
}

/// UDP endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatagramConfig {
    /// Endpoint identifier for logging.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8082").
    pub bind_address: String,

    /// Receive buffer size; larger datagrams are truncated by the OS.
    pub max_datagram_size: usize,
}

impl DatagramConfig {
    pub fn new(name: &str, bind_address: &str) -> Self {
        Self {
            name: name.to_string(),
            bind_address: bind_address.to_string(),
            ..Self::default()
        }
    }
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            name: "udp".to_string(),
            bind_address: "0.0.0.0:8082".to_string(),
            max_datagram_size: 65_535,
        }
    }
}

/// TLS certificate material.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration. A value of zero disables the corresponding deadline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for an HTTP request head to complete once its first byte
    /// arrived on a sniffed endpoint, in milliseconds.
    pub sniff_ms: u64,

    /// TLS handshake timeout in seconds.
    pub handshake_secs: u64,

    /// Maximum time a session may wait for the peer's next bytes, in seconds.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn sniff(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.sniff_ms))
    }

    pub fn handshake(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.handshake_secs))
    }

    pub fn idle(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.idle_secs))
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            sniff_ms: 1_000,
            handshake_secs: 10,
            idle_secs: 300,
        }
    }
}

/// Buffer and framing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest chunk read (and echoed) at once by a raw session.
    pub read_chunk_size: usize,

    /// Maximum size of an HTTP request line plus headers.
    pub max_head_bytes: usize,

    /// Maximum number of HTTP request headers.
    pub max_headers: usize,

    /// Maximum HTTP request body (and WebSocket message) size.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 1024,
            max_head_bytes: 16 * 1024,
            max_headers: 64,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// HTTP response policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Value of the `Server` response header.
    pub server_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_header: concat!("echo-server/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for open sessions after the listeners stop, in seconds.
    pub drain_secs: u64,
}

impl ShutdownConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_secs: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_ports() {
        let config = EchoConfig::default();
        assert_eq!(config.endpoints[0].bind_address, "0.0.0.0:8080");
        assert_eq!(config.endpoints[0].mode, SessionMode::Http);
        assert_eq!(config.endpoints[1].bind_address, "0.0.0.0:8081");
        assert_eq!(config.endpoints[1].mode, SessionMode::Raw);
        assert_eq!(config.datagram[0].bind_address, "0.0.0.0:8082");
        assert!(config.tls.is_none());
    }

    #[test]
    fn port_overrides() {
        let mut config = EchoConfig::default();
        assert!(config.set_endpoint_port(SessionMode::Http, 9000));
        assert!(config.set_datagram_port(9002));
        assert!(!config.set_endpoint_port(SessionMode::Sniff, 9003));
        assert_eq!(config.endpoints[0].bind_address, "0.0.0.0:9000");
        assert_eq!(config.datagram[0].bind_address, "0.0.0.0:9002");
    }

    #[test]
    fn zero_timeouts_disable_deadlines() {
        let timeouts = TimeoutConfig {
            sniff_ms: 0,
            handshake_secs: 3,
            idle_secs: 0,
        };
        assert_eq!(timeouts.sniff(), None);
        assert_eq!(timeouts.handshake(), Some(Duration::from_secs(3)));
        assert_eq!(timeouts.idle(), None);
    }

    #[test]
    fn deserializes_partial_toml() {
        let config: EchoConfig = toml::from_str(
            r#"
            [[endpoints]]
            name = "combined"
            bind_address = "127.0.0.1:7000"
            mode = "sniff"
            tls = true

            [tls]
            cert_path = "cert.pem"
            key_path = "key.pem"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].mode, SessionMode::Sniff);
        assert!(config.endpoints[0].tls);
        assert_eq!(config.endpoints[0].max_connections, 10_000);
        assert_eq!(config.datagram.len(), 1);
        assert_eq!(config.limits.read_chunk_size, 1024);
    }
}
