//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, addresses parse)
//! - Detect endpoints that would collide on bind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EchoConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::EchoConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no TCP or UDP endpoints configured")]
    NoEndpoints,

    #[error("endpoint `{name}`: invalid bind address `{address}`")]
    InvalidAddress { name: String, address: String },

    #[error("{transport} address `{address}` is bound by more than one endpoint")]
    DuplicateAddress {
        transport: &'static str,
        address: String,
    },

    #[error("endpoint `{name}` enables TLS but no [tls] section is configured")]
    TlsNotConfigured { name: String },

    #[error("`{field}` must be greater than zero")]
    Zero { field: String },

    #[error("http.server_header contains characters not allowed in a header value")]
    InvalidServerHeader,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &EchoConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() && config.datagram.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    let mut tcp_seen = HashSet::new();
    for endpoint in &config.endpoints {
        match endpoint.bind_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if addr.port() != 0 && !tcp_seen.insert(addr) {
                    errors.push(ValidationError::DuplicateAddress {
                        transport: "tcp",
                        address: endpoint.bind_address.clone(),
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                name: endpoint.name.clone(),
                address: endpoint.bind_address.clone(),
            }),
        }
        if endpoint.tls && config.tls.is_none() {
            errors.push(ValidationError::TlsNotConfigured {
                name: endpoint.name.clone(),
            });
        }
        if endpoint.max_connections == 0 {
            errors.push(ValidationError::Zero {
                field: format!("endpoints.{}.max_connections", endpoint.name),
            });
        }
    }

    let mut udp_seen = HashSet::new();
    for datagram in &config.datagram {
        match datagram.bind_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if addr.port() != 0 && !udp_seen.insert(addr) {
                    errors.push(ValidationError::DuplicateAddress {
                        transport: "udp",
                        address: datagram.bind_address.clone(),
                    });
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                name: datagram.name.clone(),
                address: datagram.bind_address.clone(),
            }),
        }
        if datagram.max_datagram_size == 0 {
            errors.push(ValidationError::Zero {
                field: format!("datagram.{}.max_datagram_size", datagram.name),
            });
        }
    }

    let limits = &config.limits;
    for (field, value) in [
        ("limits.read_chunk_size", limits.read_chunk_size),
        ("limits.max_head_bytes", limits.max_head_bytes),
        ("limits.max_headers", limits.max_headers),
        ("limits.max_body_bytes", limits.max_body_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero {
                field: field.to_string(),
            });
        }
    }

    if http::HeaderValue::from_str(&config.http.server_header).is_err() {
        errors.push(ValidationError::InvalidServerHeader);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
