//! # Connection Secret Stores
//!
//! The [`Store`] contract every backend satisfies, the canonical [`Secret`]
//! record, write/delete guards and the builder registry that turns a decoded
//! StoreConfig into a live store.
//!
//! ## Backends
//!
//! - [`kubernetes::KubernetesStore`]: Secret objects in the local or a remote cluster
//! - [`vault::VaultStore`]: Vault KV engine, v1 (flat) or v2 (versioned, with metadata)
//! - [`plugin::ExternalStore`]: external plugin over gRPC with mutual TLS
//! - [`memory::InMemoryStore`]: process-local, for tests and dry runs

pub mod config;
pub mod credentials;
pub mod kubernetes;
pub mod memory;
pub mod options;
pub mod plugin;
pub mod registry;
pub mod secret;
pub mod types;
pub mod vault;

use std::sync::Arc;

use async_trait::async_trait;

pub use config::{StoreConfigSpec, StoreType};
pub use credentials::CredentialsExtractor;
pub use memory::InMemoryStore;
pub use options::{DeleteOption, MustBeOwnedBy, WriteOption};
pub use registry::{BuildContext, StoreBuilderFn, StoreRegistry};
pub use secret::{key_values, KeyValues, ScopedName, Secret, SecretMetadata};
pub use types::SecretString;

use crate::errors::{ConnectionError, ErrorKind, Result};

/// Log a failed backend call. Absent secrets and guard rejections are
/// expected outcomes and are left to the caller.
pub(crate) fn log_failure(operation: &str, err: &ConnectionError) {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::Conflict => {}
        _ => tracing::error!(operation, error = %err, "Secret store call failed"),
    }
}

/// Common contract of every connection secret backend.
///
/// Implementations are stateless over their receiver apart from immutable
/// configuration, so a single instance may serve concurrent calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a secret by scoped name.
    ///
    /// An absent secret is reported as a not-found error
    /// (see [`ConnectionError::is_not_found`](crate::errors::ConnectionError::is_not_found)).
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret>;

    /// Write a secret's key/values after the options accepted the current state.
    ///
    /// Returns whether the backend was actually mutated.
    async fn write_key_values(&self, secret: &Secret, options: &[&dyn WriteOption])
        -> Result<bool>;

    /// Delete the requested keys, or the whole secret when no keys are given.
    ///
    /// Deleting an absent secret succeeds.
    async fn delete_key_values(&self, secret: &Secret, options: &[&dyn DeleteOption])
        -> Result<()>;

    /// Backend type tag this store was built for.
    fn store_type(&self) -> StoreType;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret> {
        (**self).read_key_values(name).await
    }

    async fn write_key_values(&self, secret: &Secret, options: &[&dyn WriteOption])
        -> Result<bool> {
        (**self).write_key_values(secret, options).await
    }

    async fn delete_key_values(&self, secret: &Secret, options: &[&dyn DeleteOption])
        -> Result<()> {
        (**self).delete_key_values(secret, options).await
    }

    fn store_type(&self) -> StoreType {
        (**self).store_type()
    }
}
