//! # Configuration Settings
//!
//! Process settings for the details manager and the `connstore` binary,
//! loaded from `CONNSTORE_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConnectionError, Result};

/// Group/version/kind of the StoreConfig custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfigKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Default for StoreConfigKind {
    fn default() -> Self {
        Self {
            group: "secrets.connstore.io".to_string(),
            version: "v1alpha1".to_string(),
            kind: "StoreConfig".to_string(),
        }
    }
}

impl StoreConfigKind {
    /// `group/version`, as written in `apiVersion`.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConnectionError::config(format!(
                "invalid log format '{}': expected text or json",
                other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

/// Settings of the details manager and the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    pub store_config_kind: StoreConfigKind,

    /// StoreConfig used when a publish target names none.
    pub default_store_config: String,

    /// Directory with `ca.crt`, `tls.crt`, `tls.key` for plugin mTLS.
    pub plugin_tls_dir: PathBuf,

    pub logging: LoggingConfig,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            store_config_kind: StoreConfigKind::default(),
            default_store_config: "default".to_string(),
            plugin_tls_dir: PathBuf::from("/tls/client"),
            logging: LoggingConfig::default(),
        }
    }
}

impl ManagerSettings {
    /// Load settings from environment variables.
    ///
    /// Uses:
    /// - `CONNSTORE_STORE_CONFIG_GROUP`, `CONNSTORE_STORE_CONFIG_VERSION`,
    ///   `CONNSTORE_STORE_CONFIG_KIND`
    /// - `CONNSTORE_DEFAULT_STORE_CONFIG` (default: "default")
    /// - `CONNSTORE_PLUGIN_TLS_DIR` (default: "/tls/client")
    /// - `CONNSTORE_LOG_LEVEL` (default: "info")
    /// - `CONNSTORE_LOG_FORMAT` (text | json)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str, default: String| {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).unwrap_or(default)
        };

        let store_config_kind = StoreConfigKind {
            group: var("CONNSTORE_STORE_CONFIG_GROUP", defaults.store_config_kind.group),
            version: var("CONNSTORE_STORE_CONFIG_VERSION", defaults.store_config_kind.version),
            kind: var("CONNSTORE_STORE_CONFIG_KIND", defaults.store_config_kind.kind),
        };

        let format = match lookup("CONNSTORE_LOG_FORMAT").filter(|v| !v.trim().is_empty()) {
            Some(value) => value.trim().parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            store_config_kind,
            default_store_config: var(
                "CONNSTORE_DEFAULT_STORE_CONFIG",
                defaults.default_store_config,
            ),
            plugin_tls_dir: PathBuf::from(var(
                "CONNSTORE_PLUGIN_TLS_DIR",
                defaults.plugin_tls_dir.display().to_string(),
            )),
            logging: LoggingConfig {
                level: var("CONNSTORE_LOG_LEVEL", defaults.logging.level),
                format,
            },
        })
    }
}
