//! # connstore
//!
//! Publishes the connection details of managed resources (endpoints, user
//! names, passwords, certificates) to a pluggable secret store and reads them
//! back, guarding every write and delete by owner identity.
//!
//! ## Architecture
//!
//! ```text
//! DetailsManager → StoreConfigResolver → StoreRegistry → Store
//!                                                        ├─ Kubernetes Secret objects
//!                                                        ├─ Vault KV v1 / v2
//!                                                        └─ External plugin (gRPC + mTLS)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use connstore::{DetailsManager, ManagerSettings, PublishConnectionDetailsTo, ResourceOwner};
//! use connstore::store::key_values;
//!
//! # async fn run() -> connstore::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let manager = DetailsManager::from_settings(client, &ManagerSettings::from_env()?);
//!
//! let owner = ResourceOwner::new("5c3e9a1e", "team-a")
//!     .publishing_to(PublishConnectionDetailsTo::new("db-conn").with_config("vault"));
//! manager.publish_connection(&owner, &key_values([("password", "s3cr3t")])).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod errors;
pub mod observability;
pub mod proto;
pub mod store;

// Re-export commonly used types and traits
pub use config::ManagerSettings;
pub use connection::{
    ConnectionSecretOwner, DetailsManager, PublishConnectionDetailsTo, ResourceOwner,
    StoreConfigResolver,
};
pub use errors::{ConnectionError, ErrorKind, Result};
pub use store::{KeyValues, ScopedName, Secret, SecretMetadata, Store, StoreRegistry, StoreType};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
