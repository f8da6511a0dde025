//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)          CLI flags
//!     → loader.rs (parse)        │
//!     → overrides applied ◀──────┘
//!     → validation.rs (semantic checks)
//!     → EchoConfig (validated, immutable)
//!     → endpoints bound, session context built
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    DatagramConfig, EchoConfig, EndpointConfig, HttpConfig, LimitsConfig, LogFormat,
    ObservabilityConfig, SessionMode, ShutdownConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
