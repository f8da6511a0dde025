//! TLS configuration, certificate loading, and the server-side handshake.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::observability::metrics;
use crate::resilience::within;
use crate::session::SessionError;

/// Error type for TLS context construction.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    MissingKey(String),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Build a TLS acceptor from PEM certificate chain and private key files.
pub fn load_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(Path::new(&config.cert_path))?;
    let key = load_key(Path::new(&config.key_path))?;

    let server_config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    tracing::info!(cert = %config.cert_path, "TLS context loaded");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingKey(path.display().to_string()))
}

/// Run the server handshake on a freshly accepted stream.
///
/// No application byte is read or written before this returns. On failure
/// the stream is dropped, closing the connection.
pub async fn handshake<S>(
    acceptor: &TlsAcceptor,
    stream: S,
    limit: Option<Duration>,
) -> Result<TlsStream<S>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = match within(limit, acceptor.accept(stream)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(SessionError::Handshake(e)),
        Err(_) => Err(SessionError::TimedOut("TLS handshake")),
    };
    if result.is_err() {
        metrics::record_tls_failure();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    #[test]
    fn loads_fixture_material() {
        let config = TlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("key.pem"),
        };
        assert!(load_tls_acceptor(&config).is_ok());
    }

    #[test]
    fn missing_file_is_read_error() {
        let config = TlsConfig {
            cert_path: fixture("absent.pem"),
            key_path: fixture("key.pem"),
        };
        assert!(matches!(load_tls_acceptor(&config), Err(TlsError::Read { .. })));
    }

    #[test]
    fn key_file_without_certificates_is_rejected() {
        let config = TlsConfig {
            cert_path: fixture("key.pem"),
            key_path: fixture("key.pem"),
        };
        assert!(matches!(load_tls_acceptor(&config), Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn certificate_file_without_key_is_rejected() {
        let config = TlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("cert.pem"),
        };
        assert!(matches!(load_tls_acceptor(&config), Err(TlsError::MissingKey(_))));
    }

    #[tokio::test]
    async fn plaintext_client_fails_handshake() {
        use tokio::io::AsyncWriteExt;

        let acceptor = load_tls_acceptor(&TlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("key.pem"),
        })
        .unwrap();

        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let err = handshake(&acceptor, server, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let acceptor = load_tls_acceptor(&TlsConfig {
            cert_path: fixture("cert.pem"),
            key_path: fixture("key.pem"),
        })
        .unwrap();

        let (_client, server) = tokio::io::duplex(1024);
        let err = handshake(&acceptor, server, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(_)));
    }
}
