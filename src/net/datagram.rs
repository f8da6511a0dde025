//! UDP echo loop.
//!
//! # Responsibilities
//! - Bind one UDP socket per configured datagram endpoint
//! - Send every datagram back, whole, to the address it came from
//! - Survive receive and send errors
//!
//! # Design Decisions
//! - Strictly stateless: nothing is remembered between datagrams
//! - The reply target is the sender recorded on that very receive

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::config::DatagramConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::listener::ListenerError;
use crate::observability::Transport;
use crate::session::{Peer, SessionContext};

/// Bind the socket for a datagram endpoint.
pub async fn bind(config: &DatagramConfig) -> Result<UdpSocket, ListenerError> {
    let bind_error = |source: std::io::Error| ListenerError::Bind {
        name: config.name.clone(),
        address: config.bind_address.clone(),
        source,
    };

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e| bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    let socket = UdpSocket::bind(addr).await.map_err(bind_error)?;

    tracing::info!(
        endpoint = %config.name,
        address = %socket.local_addr().map_err(bind_error)?,
        "Datagram socket bound"
    );
    Ok(socket)
}

/// Echo datagrams until shutdown.
pub async fn run(
    socket: UdpSocket,
    max_datagram_size: usize,
    ctx: Arc<SessionContext>,
    mut shutdown: ShutdownSignal,
) {
    let mut buf = vec![0u8; max_datagram_size];

    loop {
        let received = tokio::select! {
            _ = shutdown.recv() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (n, sender) = match received {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(error = %e, "Error receiving datagram");
                continue;
            }
        };

        let peer = Peer {
            addr: sender,
            tls: false,
        };
        ctx.record(Transport::Udp, &peer, &buf[..n]);

        if let Err(e) = socket.send_to(&buf[..n], sender).await {
            tracing::warn!(peer = %sender, bytes = n, error = %e, "Error sending datagram");
        }
    }

    tracing::debug!("Datagram loop stopped");
}
