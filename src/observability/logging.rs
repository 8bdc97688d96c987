//! # Structured Logging
//!
//! Subscriber initialisation and span macros for store calls and manager
//! operations. Fields carry names, scopes and paths; never secret values.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Create a tracing span for a store call.
///
/// ```rust,ignore
/// let span = store_span!("write", "Vault", "connections/db");
/// ```
#[macro_export]
macro_rules! store_span {
    ($operation:expr, $store:expr, $name:expr) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            store = %$store,
            name = %$name,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $store:expr, $name:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            store = %$store,
            name = %$name,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a details manager operation.
///
/// The `owner_uid` field identifies the resource on whose behalf the
/// operation runs.
#[macro_export]
macro_rules! connection_span {
    ($operation:expr, $owner_uid:expr) => {
        tracing::info_span!(
            "connection_operation",
            operation = %$operation,
            owner_uid = %$owner_uid,
            operation_id = %uuid::Uuid::new_v4(),
            store_config = tracing::field::Empty
        )
    };
    ($operation:expr, $owner_uid:expr, $($field:tt)*) => {
        tracing::info_span!(
            "connection_operation",
            operation = %$operation,
            owner_uid = %$owner_uid,
            operation_id = %uuid::Uuid::new_v4(),
            store_config = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. A subscriber that is already
/// installed (e.g. by a test harness) is left in place.
pub fn init_logging(config: &LoggingConfig) {
    // Already installed elsewhere (tests, embedding binary).
    let _ = tracing::subscriber::set_global_default(build_subscriber(config));
}

/// Subscriber for `config` writing to stdout, without installing it.
pub fn build_subscriber(config: &LoggingConfig) -> Box<dyn Subscriber + Send + Sync> {
    subscriber_with_writer(config, std::io::stdout)
}

fn subscriber_with_writer<W>(config: &LoggingConfig, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_writer(writer);
    match config.format {
        LogFormat::Text => Box::new(builder.with_target(true).compact().finish()),
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
    }
}

/// Log the effective settings at startup.
pub fn log_settings(settings: &crate::config::ManagerSettings) {
    tracing::info!(
        store_config_api_version = %settings.store_config_kind.api_version(),
        store_config_kind = %settings.store_config_kind.kind,
        default_store_config = %settings.default_store_config,
        plugin_tls_dir = %settings.plugin_tls_dir.display(),
        log_format = %settings.logging.format,
        "connstore configuration"
    );
}
