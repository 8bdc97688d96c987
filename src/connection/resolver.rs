//! StoreConfig lookup by name.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::api::Api;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use tracing::debug;

use crate::config::StoreConfigKind;
use crate::errors::{ConnectionError, Context, Result, ResultExt};
use crate::store::StoreConfigSpec;

/// Resolves a StoreConfig name into its decoded spec.
#[async_trait]
pub trait StoreConfigResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<StoreConfigSpec>;
}

/// Reads cluster-scoped StoreConfig objects of a configured kind.
#[derive(Clone)]
pub struct KubeStoreConfigResolver {
    client: kube::Client,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeStoreConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStoreConfigResolver")
            .field("api_version", &self.resource.api_version)
            .field("kind", &self.resource.kind)
            .finish()
    }
}

impl KubeStoreConfigResolver {
    pub fn new(client: kube::Client, kind: &StoreConfigKind) -> Self {
        let gvk = GroupVersionKind::gvk(&kind.group, &kind.version, &kind.kind);
        Self { client, resource: ApiResource::from_gvk(&gvk) }
    }
}

#[async_trait]
impl StoreConfigResolver for KubeStoreConfigResolver {
    async fn resolve(&self, name: &str) -> Result<StoreConfigSpec> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource);
        let object = api
            .get_opt(name)
            .await?
            .ok_or_else(|| ConnectionError::config_not_found(&self.resource.kind, name))?;

        debug!(kind = %self.resource.kind, name = %name, "Resolved store config");
        decode_spec(&self.resource.kind, name, &object)
    }
}

/// Decode `spec` of a StoreConfig object.
pub fn decode_spec(kind: &str, name: &str, object: &DynamicObject) -> Result<StoreConfigSpec> {
    match object.data.get("spec") {
        None | Some(serde_json::Value::Null) => {
            Err(ConnectionError::config(format!("{kind} {name} has no spec")))
        }
        Some(spec) => serde_json::from_value(spec.clone()).context(Context::ParseStoreConfig),
    }
}

/// Fixed set of StoreConfigs held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticStoreConfigResolver {
    configs: HashMap<String, StoreConfigSpec>,
}

impl StaticStoreConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: StoreConfigSpec) -> Self {
        self.insert(name, spec);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: StoreConfigSpec) {
        self.configs.insert(name.into(), spec);
    }
}

#[async_trait]
impl StoreConfigResolver for StaticStoreConfigResolver {
    async fn resolve(&self, name: &str) -> Result<StoreConfigSpec> {
        self.configs
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::config_not_found("StoreConfig", name))
    }
}
