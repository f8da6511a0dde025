//! Echo server (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     ECHO SERVER                      │
//!                 │                                                      │
//!   TCP client ───┼─▶ listener ─▶ [tls] ─▶ sniffer ─┬─▶ raw echo          │
//!                 │                                 ├─▶ http echo         │
//!                 │                                 └─▶ websocket echo    │
//!                 │                                                      │
//!   UDP client ───┼─▶ datagram loop (receive → send back to sender)      │
//!                 │                                                      │
//!                 │  config · observability · lifecycle · resilience     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use echo_server::config::{read_config, validate_config, EchoConfig, SessionMode, TlsConfig};
use echo_server::lifecycle::{wait_for_signal, Shutdown};
use echo_server::observability::logging::init_logging;
use echo_server::observability::metrics::init_metrics;
use echo_server::observability::TracingRecorder;
use echo_server::EchoServer;

/// Bytes of each payload shown in echo log events.
const LOG_PREVIEW_BYTES: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "echo-server", version, about = "TCP, UDP, HTTP and WebSocket echo server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// TCP port
    #[arg(long)]
    tcp_port: Option<u16>,

    /// UDP port
    #[arg(long)]
    udp_port: Option<u16>,

    /// Serve HTTP over TLS (material from --tls-cert/--tls-key or [tls])
    #[arg(long)]
    tls: bool,

    /// PEM certificate chain
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<String>,

    /// PEM private key
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut EchoConfig) -> Result<(), String> {
        if let Some(port) = self.http_port {
            if !config.set_endpoint_port(SessionMode::Http, port) {
                return Err("--http-port given but no http endpoint is configured".into());
            }
        }
        if let Some(port) = self.tcp_port {
            if !config.set_endpoint_port(SessionMode::Raw, port) {
                return Err("--tcp-port given but no raw endpoint is configured".into());
            }
        }
        if let Some(port) = self.udp_port {
            if !config.set_datagram_port(port) {
                return Err("--udp-port given but no datagram endpoint is configured".into());
            }
        }
        if let (Some(cert_path), Some(key_path)) = (&self.tls_cert, &self.tls_key) {
            config.tls = Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            });
        }
        if self.tls {
            config
                .endpoints
                .iter_mut()
                .filter(|e| e.mode == SessionMode::Http)
                .for_each(|e| e.tls = true);
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => EchoConfig::default(),
    };
    if let Err(e) = args.apply(&mut config) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(errors) = validate_config(&config) {
        for e in errors {
            eprintln!("Error: {e}");
        }
        return ExitCode::FAILURE;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "echo-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let recorder = Arc::new(TracingRecorder::new(LOG_PREVIEW_BYTES));
    let server = match EchoServer::bind(&config, recorder).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    println!("Server starting with the following parameters:");
    for bound in server.local_addrs() {
        println!("{} ({}) port: {}", bound.name, bound.protocol, bound.addr.port());
        tracing::info!(endpoint = %bound.name, protocol = bound.protocol, address = %bound.addr, "Listening");
    }

    let shutdown = Shutdown::new();
    let running = tokio::spawn(server.run(shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();

    if let Err(e) = running.await {
        tracing::error!(error = %e, "Server task failed");
        return ExitCode::FAILURE;
    }
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_server::config::ValidationError;

    #[test]
    fn port_flags_override_defaults() {
        let args = Args::parse_from(["echo-server", "--http-port", "9000", "--udp-port", "9002"]);
        let mut config = EchoConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.endpoints[0].bind_address, "0.0.0.0:9000");
        assert_eq!(config.endpoints[1].bind_address, "0.0.0.0:8081");
        assert_eq!(config.datagram[0].bind_address, "0.0.0.0:9002");
    }

    #[test]
    fn tls_flag_wraps_http_endpoints() {
        let args = Args::parse_from([
            "echo-server",
            "--tls",
            "--tls-cert",
            "cert.pem",
            "--tls-key",
            "key.pem",
        ]);
        let mut config = EchoConfig::default();
        args.apply(&mut config).unwrap();

        assert!(config.endpoints[0].tls);
        assert!(!config.endpoints[1].tls);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tls_flag_without_material_fails_validation() {
        let args = Args::try_parse_from(["echo-server", "--tls"]).unwrap();
        let mut config = EchoConfig::default();
        args.apply(&mut config).unwrap();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::TlsNotConfigured { name: "http".into() }));
    }

    #[test]
    fn tls_flag_uses_material_from_config_file() {
        let args = Args::try_parse_from(["echo-server", "--tls"]).unwrap();
        let mut config = EchoConfig::default();
        config.tls = Some(TlsConfig {
            cert_path: "/etc/echo/cert.pem".into(),
            key_path: "/etc/echo/key.pem".into(),
        });
        args.apply(&mut config).unwrap();

        assert!(config.endpoints[0].tls);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tls_cert_needs_a_key() {
        assert!(Args::try_parse_from(["echo-server", "--tls-cert", "cert.pem"]).is_err());
    }

    #[test]
    fn port_flag_without_endpoint_is_rejected() {
        let args = Args::parse_from(["echo-server", "--tcp-port", "1"]);
        let mut config = EchoConfig::default();
        config.endpoints.retain(|e| e.mode != SessionMode::Raw);
        assert!(args.apply(&mut config).is_err());
    }
}
