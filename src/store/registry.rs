//! Store builder registry
//!
//! Maps a StoreConfig type tag to the closure that builds a [`Store`] for it.
//! The details manager only ever sees `Box<dyn Store>`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use super::config::{StoreConfigSpec, StoreType};
use super::kubernetes::KubernetesStore;
use super::vault::VaultStore;
use super::Store;
use crate::errors::{ConnectionError, Result};

/// Everything a builder receives: the decoded StoreConfig spec and the local
/// cluster client, when one is available.
#[derive(Clone)]
pub struct BuildContext {
    pub local_client: Option<kube::Client>,
    pub spec: StoreConfigSpec,
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("local_client", &self.local_client.is_some())
            .field("spec", &self.spec)
            .finish()
    }
}

impl BuildContext {
    pub fn new(local_client: Option<kube::Client>, spec: StoreConfigSpec) -> Self {
        Self { local_client, spec }
    }
}

/// Builds a store from a [`BuildContext`].
pub type StoreBuilderFn =
    Arc<dyn Fn(BuildContext) -> BoxFuture<'static, Result<Box<dyn Store>>> + Send + Sync>;

/// Registry of store builders keyed by type tag.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    builders: HashMap<StoreType, StoreBuilderFn>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry").field("store_types", &self.registered_types()).finish()
    }
}

impl StoreRegistry {
    /// Create a registry with no builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Kubernetes and Vault builders.
    ///
    /// External plugin stores need client TLS material the registry does not
    /// own; register them with
    /// [`ExternalStore::builder`](super::plugin::ExternalStore::builder).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(StoreType::Kubernetes, KubernetesStore::builder());
        registry.register(StoreType::Vault, VaultStore::builder());
        registry
    }

    /// Register (or replace) the builder for a store type.
    pub fn register(&mut self, store_type: StoreType, builder: StoreBuilderFn) {
        info!(store_type = %store_type, "Registering store builder");
        self.builders.insert(store_type, builder);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, store_type: StoreType, builder: StoreBuilderFn) -> Self {
        self.register(store_type, builder);
        self
    }

    pub fn has_builder(&self, store_type: &StoreType) -> bool {
        self.builders.contains_key(store_type)
    }

    /// Registered store types, sorted by tag.
    pub fn registered_types(&self) -> Vec<StoreType> {
        let mut types: Vec<_> = self.builders.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    /// Build a store for the context's spec type.
    pub async fn build(&self, ctx: BuildContext) -> Result<Box<dyn Store>> {
        let store_type = ctx.spec.store_type.clone();
        let builder = self
            .builders
            .get(&store_type)
            .cloned()
            .ok_or_else(|| ConnectionError::UnsupportedStoreType(store_type.to_string()))?;

        debug!(store_type = %store_type, "Building store");
        builder(ctx).await
    }
}
