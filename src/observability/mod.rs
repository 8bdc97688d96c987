//! # Observability Infrastructure
//!
//! Structured logging for the details manager, the stores and the binary.

pub mod logging;

pub use logging::{build_subscriber, init_logging, log_settings};
