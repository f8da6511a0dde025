//! Raw byte-stream echo session.
//!
//! ```text
//! OPEN ──read chunk──▶ ECHO ──write same bytes──▶ OPEN
//!   │                                               │
//!   └── EOF / reset ──▶ CLOSED ◀── read/write error ┘
//! ```
//!
//! Each write carries exactly the bytes of the preceding read. Chunk
//! boundaries follow whatever the socket delivered, not the sender's writes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::observability::Transport;
use crate::resilience::within;
use crate::session::{is_disconnect, Peer, SessionContext, SessionError};

/// Echo bytes until the peer closes, resets, or an error occurs.
pub async fn run<S>(mut stream: S, ctx: &SessionContext, peer: Peer) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; ctx.limits.read_chunk_size];
    let mut echoed: u64 = 0;

    loop {
        let n = match within(ctx.timeouts.idle(), stream.read(&mut buf)).await {
            Err(_) => return Err(SessionError::TimedOut("data")),
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) if is_disconnect(&e) => {
                tracing::debug!(error = %e, "Peer reset raw session");
                break;
            }
            Ok(Err(e)) => return Err(e.into()),
        };

        ctx.record(Transport::Tcp, &peer, &buf[..n]);
        stream.write_all(&buf[..n]).await?;
        stream.flush().await?;
        echoed += n as u64;
    }

    tracing::debug!(bytes = echoed, "Raw session finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::EchoConfig;
    use crate::observability::MemoryRecorder;

    fn context(recorder: &MemoryRecorder, chunk: usize) -> SessionContext {
        let mut config = EchoConfig::default();
        config.limits.read_chunk_size = chunk;
        SessionContext::new(&config, Arc::new(recorder.clone()))
    }

    fn peer() -> Peer {
        Peer {
            addr: "127.0.0.1:5555".parse().unwrap(),
            tls: false,
        }
    }

    #[tokio::test]
    async fn each_read_is_written_back_once() {
        let recorder = MemoryRecorder::new();
        let stream = tokio_test::io::Builder::new()
            .read(b"hello")
            .write(b"hello")
            .read(b"world!")
            .write(b"world!")
            .build();

        run(stream, &context(&recorder, 1024), peer()).await.unwrap();

        let events = recorder.for_transport(Transport::Tcp);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, b"hello");
        assert_eq!(events[1].payload, b"world!");
    }

    #[tokio::test]
    async fn reads_are_bounded_by_chunk_size() {
        let recorder = MemoryRecorder::new();
        let stream = tokio_test::io::Builder::new()
            .read(b"abcdefgh")
            .write(b"abcd")
            .write(b"efgh")
            .build();

        run(stream, &context(&recorder, 4), peer()).await.unwrap();
        assert_eq!(recorder.events().len(), 2);
    }

    #[tokio::test]
    async fn reset_is_normal_termination() {
        let recorder = MemoryRecorder::new();
        let stream = tokio_test::io::Builder::new()
            .read(b"ping")
            .write(b"ping")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();

        assert!(run(stream, &context(&recorder, 1024), peer()).await.is_ok());
    }

    #[tokio::test]
    async fn other_read_errors_are_reported() {
        let recorder = MemoryRecorder::new();
        let stream = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::Other, "boom"))
            .build();

        let err = run(stream, &context(&recorder, 1024), peer()).await.unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn write_failure_ends_session() {
        let recorder = MemoryRecorder::new();
        let stream = tokio_test::io::Builder::new()
            .read(b"data")
            .write_error(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            .build();

        let err = run(stream, &context(&recorder, 1024), peer()).await.unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_peer_times_out() {
        let recorder = MemoryRecorder::new();
        let mut config = EchoConfig::default();
        config.timeouts.idle_secs = 2;
        let ctx = SessionContext::new(&config, Arc::new(recorder));

        let (_client, server) = tokio::io::duplex(64);
        let started = tokio::time::Instant::now();
        let err = run(server, &ctx, peer()).await.unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(_)));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
