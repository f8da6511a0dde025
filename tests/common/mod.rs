//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use echo_server::config::{
    DatagramConfig, EchoConfig, EndpointConfig, SessionMode, TlsConfig,
};
use echo_server::lifecycle::Shutdown;
use echo_server::observability::MemoryRecorder;
use echo_server::EchoServer;

/// Upper bound for any single network step in a test.
pub const STEP: Duration = Duration::from_secs(5);

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Loopback config with one endpoint per mode, a TLS HTTP endpoint and a UDP socket.
pub fn loopback_config() -> EchoConfig {
    let mut config = EchoConfig::default();
    config.endpoints = vec![
        EndpointConfig::new("http", "127.0.0.1:0", SessionMode::Http),
        EndpointConfig::new("tcp", "127.0.0.1:0", SessionMode::Raw),
        EndpointConfig::new("combined", "127.0.0.1:0", SessionMode::Sniff),
        EndpointConfig {
            tls: true,
            ..EndpointConfig::new("https", "127.0.0.1:0", SessionMode::Http)
        },
    ];
    config.datagram = vec![DatagramConfig::new("udp", "127.0.0.1:0")];
    config.tls = Some(TlsConfig {
        cert_path: fixture("cert.pem"),
        key_path: fixture("key.pem"),
    });
    config.shutdown.drain_secs = 1;
    config
}

/// A running server on ephemeral loopback ports.
pub struct TestServer {
    pub recorder: MemoryRecorder,
    http: SocketAddr,
    tcp: SocketAddr,
    combined: SocketAddr,
    https: SocketAddr,
    udp: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let recorder = MemoryRecorder::new();
        let server = EchoServer::bind(&loopback_config(), Arc::new(recorder.clone()))
            .await
            .expect("bind test server");

        let addr = |name: &str| server.tcp_addr(name).expect("stream endpoint");
        let (http, tcp, combined, https) = (addr("http"), addr("tcp"), addr("combined"), addr("https"));
        let udp = server.udp_addr("udp").expect("datagram endpoint");

        let shutdown = Shutdown::new();
        let task = tokio::spawn(server.run(shutdown.subscribe()));

        Self {
            recorder,
            http,
            tcp,
            combined,
            https,
            udp,
            shutdown,
            task,
        }
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp
    }

    pub fn combined_addr(&self) -> SocketAddr {
        self.combined
    }

    pub fn https_addr(&self) -> SocketAddr {
        self.https
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(STEP, self.task)
            .await
            .expect("server stops in time")
            .expect("server task");
    }
}

/// A response read off the wire.
#[derive(Debug)]
pub struct RawResponse {
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Read one `Content-Length` framed response.
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> RawResponse {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = tokio::time::timeout(STEP, stream.read_u8())
            .await
            .expect("response head in time")
            .expect("response head byte");
        head.push(byte);
    }
    let head = String::from_utf8(head).expect("ASCII head");

    let mut response = RawResponse {
        head,
        body: Vec::new(),
    };
    let len: usize = response
        .header("content-length")
        .expect("Content-Length header")
        .parse()
        .expect("numeric Content-Length");
    response.body = vec![0u8; len];
    tokio::time::timeout(STEP, stream.read_exact(&mut response.body))
        .await
        .expect("response body in time")
        .expect("response body");
    response
}

/// Read until the peer closes; panics if it stays open past [`STEP`].
pub async fn read_until_closed<S: AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut out = Vec::new();
    // A reset after close is as good as EOF here.
    let _ = tokio::time::timeout(STEP, stream.read_to_end(&mut out))
        .await
        .expect("peer closes in time");
    out
}
