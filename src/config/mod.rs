//! # Configuration Management
//!
//! Environment-driven process settings and plugin client TLS loading.

pub mod settings;
pub mod tls;

pub use settings::{LogFormat, LoggingConfig, ManagerSettings, StoreConfigKind};
pub use tls::{load_client_tls, ClientTlsMaterial};
