//! Server assembly: bind every endpoint, run accept and datagram loops, drain.
//!
//! # Responsibilities
//! - Bind all stream and datagram endpoints up front (bind failure is fatal)
//! - Spawn one task per accepted connection
//! - Apply the optional TLS handshake before any session byte is read
//! - Stop accepting on shutdown and give open sessions time to finish
//!
//! # Design Decisions
//! - Endpoints share one `SessionContext` and one `SessionTracker`
//! - A failed accept is logged and the loop continues

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::{EchoConfig, SessionMode};
use crate::lifecycle::ShutdownSignal;
use crate::net::tls::{self, TlsError};
use crate::net::{datagram, Listener, ListenerError, SessionTracker};
use crate::observability::Recorder;
use crate::routing::route;
use crate::session::{log_outcome, Peer, SessionContext, SessionError};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) cannot spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("endpoint `{0}` enables TLS but no [tls] section is configured")]
    TlsNotConfigured(String),
}

/// An address the server is actually bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAddress {
    pub name: String,
    pub protocol: &'static str,
    pub addr: SocketAddr,
}

struct StreamEndpoint {
    name: String,
    mode: SessionMode,
    listener: Listener,
    tls: Option<TlsAcceptor>,
}

struct DatagramEndpoint {
    name: String,
    socket: UdpSocket,
    max_datagram_size: usize,
}

/// A bound, not yet running, echo server.
pub struct EchoServer {
    streams: Vec<StreamEndpoint>,
    datagrams: Vec<DatagramEndpoint>,
    ctx: Arc<SessionContext>,
    tracker: SessionTracker,
    handshake_timeout: Option<Duration>,
    drain: Duration,
}

impl EchoServer {
    /// Bind every configured endpoint.
    pub async fn bind(config: &EchoConfig, recorder: Arc<dyn Recorder>) -> Result<Self, StartupError> {
        let acceptor = match &config.tls {
            Some(tls_config) if config.endpoints.iter().any(|e| e.tls) => {
                Some(tls::load_tls_acceptor(tls_config)?)
            }
            _ => None,
        };

        let mut streams = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let tls = if endpoint.tls {
                let acceptor = acceptor
                    .clone()
                    .ok_or_else(|| StartupError::TlsNotConfigured(endpoint.name.clone()))?;
                Some(acceptor)
            } else {
                None
            };
            streams.push(StreamEndpoint {
                name: endpoint.name.clone(),
                mode: endpoint.mode,
                listener: Listener::bind(endpoint).await?,
                tls,
            });
        }

        let mut datagrams = Vec::with_capacity(config.datagram.len());
        for endpoint in &config.datagram {
            datagrams.push(DatagramEndpoint {
                name: endpoint.name.clone(),
                socket: datagram::bind(endpoint).await?,
                max_datagram_size: endpoint.max_datagram_size,
            });
        }

        Ok(Self {
            streams,
            datagrams,
            ctx: Arc::new(SessionContext::new(config, recorder)),
            tracker: SessionTracker::new(),
            handshake_timeout: config.timeouts.handshake(),
            drain: config.shutdown.drain(),
        })
    }

    /// Every bound address, stream endpoints first.
    pub fn local_addrs(&self) -> Vec<BoundAddress> {
        let streams = self.streams.iter().filter_map(|e| {
            e.listener.local_addr().ok().map(|addr| BoundAddress {
                name: e.name.clone(),
                protocol: if e.tls.is_some() { "tls" } else { "tcp" },
                addr,
            })
        });
        let datagrams = self.datagrams.iter().filter_map(|e| {
            e.socket.local_addr().ok().map(|addr| BoundAddress {
                name: e.name.clone(),
                protocol: "udp",
                addr,
            })
        });
        streams.chain(datagrams).collect()
    }

    /// Address of the stream endpoint called `name`.
    pub fn tcp_addr(&self, name: &str) -> Option<SocketAddr> {
        self.streams
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.listener.local_addr().ok())
    }

    /// Address of the datagram endpoint called `name`.
    pub fn udp_addr(&self, name: &str) -> Option<SocketAddr> {
        self.datagrams
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.socket.local_addr().ok())
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Serve until `shutdown` fires, then wait up to the drain period for
    /// open sessions.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut loops = JoinSet::new();

        for endpoint in self.streams {
            loops.spawn(accept_loop(
                endpoint,
                Arc::clone(&self.ctx),
                self.tracker.clone(),
                self.handshake_timeout,
                shutdown.clone(),
            ));
        }
        for endpoint in self.datagrams {
            let span = tracing::info_span!("datagram", endpoint = %endpoint.name);
            loops.spawn(
                datagram::run(
                    endpoint.socket,
                    endpoint.max_datagram_size,
                    Arc::clone(&self.ctx),
                    shutdown.clone(),
                )
                .instrument(span),
            );
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Endpoint task failed");
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, drain_secs = self.drain.as_secs(), "Draining sessions");
            if !self.tracker.wait_for_drain(self.drain).await {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Drain period elapsed with sessions still open"
                );
            }
        }
        tracing::info!("Echo server stopped");
    }
}

async fn accept_loop(
    endpoint: StreamEndpoint,
    ctx: Arc<SessionContext>,
    tracker: SessionTracker,
    handshake_timeout: Option<Duration>,
    mut shutdown: ShutdownSignal,
) {
    tracing::info!(
        endpoint = %endpoint.name,
        mode = %endpoint.mode,
        tls = endpoint.tls.is_some(),
        max_connections = endpoint.listener.max_connections(),
        "Accepting connections"
    );

    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = endpoint.listener.accept() => accepted,
        };

        let (stream, addr, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint.name, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let guard = tracker.track();
        let span = tracing::info_span!(
            "session",
            id = %guard.id(),
            endpoint = %endpoint.name,
            peer = %addr
        );
        let ctx = Arc::clone(&ctx);
        let acceptor = endpoint.tls.clone();
        let mode = endpoint.mode;

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                let result = serve_connection(stream, addr, acceptor, mode, &ctx, handshake_timeout).await;
                log_outcome(result);
            }
            .instrument(span),
        );
    }

    tracing::info!(endpoint = %endpoint.name, "Listener stopped");
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    mode: SessionMode,
    ctx: &SessionContext,
    handshake_timeout: Option<Duration>,
) -> Result<(), SessionError> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    match acceptor {
        Some(acceptor) => {
            let stream = tls::handshake(&acceptor, stream, handshake_timeout).await?;
            tracing::debug!("TLS handshake complete");
            route(stream, mode, ctx, Peer { addr, tls: true }).await
        }
        None => route(stream, mode, ctx, Peer { addr, tls: false }).await,
    }
}
