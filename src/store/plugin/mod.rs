//! External plugin store
//!
//! Delegates storage to a plugin serving `ExternalSecretStoreService` over
//! gRPC with mutual TLS. Every request names the StoreConfig that authorized
//! the connection, and the plugin decides how secrets are persisted.

mod client;

pub use client::PluginClient;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Code;
use tracing::{debug, info, Instrument};

use super::config::{ConfigReference, ExternalStoreConfig, StoreType};
use super::options::{apply_delete_options, apply_write_options, DeleteOption, WriteOption};
use super::registry::{BuildContext, StoreBuilderFn};
use super::secret::{ScopedName, Secret, SecretMetadata};
use super::{log_failure, Store};
use crate::store_span;
use crate::config::load_client_tls;
use crate::errors::{ignore_not_found, ConnectionError, Context, Result, ResultExt};
use crate::proto::v1alpha1 as pb;
use crate::proto::v1alpha1::external_secret_store_service_client::ExternalSecretStoreServiceClient;

/// [`Store`] backed by an external plugin.
#[derive(Clone)]
pub struct ExternalStore {
    client: Arc<dyn PluginClient>,
    config: pb::ConfigReference,
    default_scope: String,
}

impl std::fmt::Debug for ExternalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalStore")
            .field("config", &self.config)
            .field("default_scope", &self.default_scope)
            .finish()
    }
}

impl ExternalStore {
    pub fn new(
        client: Arc<dyn PluginClient>,
        config_ref: &ConfigReference,
        default_scope: impl Into<String>,
    ) -> Self {
        Self {
            client,
            config: pb::ConfigReference {
                api_version: config_ref.api_version.clone(),
                kind: config_ref.kind.clone(),
                name: config_ref.name.clone(),
            },
            default_scope: default_scope.into(),
        }
    }

    /// Store over an already established channel.
    pub fn from_channel(
        channel: Channel,
        config_ref: &ConfigReference,
        default_scope: impl Into<String>,
    ) -> Self {
        Self::new(Arc::new(ExternalSecretStoreServiceClient::new(channel)), config_ref, default_scope)
    }

    /// Build a store from the StoreConfig's `plugin` section.
    ///
    /// The channel connects lazily; TLS material errors surface here.
    pub fn connect(ctx: BuildContext, tls: ClientTlsConfig) -> Result<Self> {
        let config: &ExternalStoreConfig = ctx
            .spec
            .plugin
            .as_ref()
            .ok_or_else(|| ConnectionError::config("store config has no plugin section"))?;

        let mut endpoint = Endpoint::from_shared(config.endpoint.clone())
            .context(Context::ConnectStore)?
            .tls_config(tls)
            .context(Context::ConnectStore)?;
        if let Some(timeout) = config.timeout() {
            endpoint = endpoint.timeout(timeout);
        }

        info!(
            endpoint = %config.endpoint,
            config_kind = %config.config_ref.kind,
            config_name = %config.config_ref.name,
            "Connected external secret store plugin"
        );

        Ok(Self::from_channel(endpoint.connect_lazy(), &config.config_ref, &ctx.spec.default_scope))
    }

    /// Registry builder using fixed client TLS material.
    pub fn builder(tls: ClientTlsConfig) -> StoreBuilderFn {
        Arc::new(move |ctx| {
            let tls = tls.clone();
            Box::pin(async move {
                let store = Self::connect(ctx, tls)?;
                Ok(Box::new(store) as Box<dyn Store>)
            })
        })
    }

    /// Registry builder that loads `ca.crt`, `tls.crt` and `tls.key` from
    /// `dir` on every build, so rotated certificates are picked up.
    pub fn builder_from_dir(dir: impl Into<PathBuf>) -> StoreBuilderFn {
        let dir = dir.into();
        Arc::new(move |ctx| {
            let dir = dir.clone();
            Box::pin(async move {
                let tls = load_client_tls(&dir).context(Context::LoadTls)?;
                let store = Self::connect(ctx, tls)?;
                Ok(Box::new(store) as Box<dyn Store>)
            })
        })
    }

    fn resolve(&self, name: &ScopedName) -> ScopedName {
        if name.scope.is_empty() {
            ScopedName::new(name.name.clone(), self.default_scope.clone())
        } else {
            name.clone()
        }
    }

    fn request_secret(&self, secret: &Secret) -> pb::Secret {
        pb::Secret {
            scoped_name: self.resolve(&secret.scoped_name).joined(),
            metadata: secret
                .metadata
                .as_ref()
                .map(|m| m.labels_with_owner().into_iter().collect())
                .unwrap_or_default(),
            data: secret.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

fn from_plugin(secret: pb::Secret, name: &ScopedName) -> Secret {
    let data = secret.data.into_iter().collect();
    let out = Secret::new(name.clone()).with_data(data);
    if secret.metadata.is_empty() {
        out
    } else {
        out.with_metadata(SecretMetadata::from_labels(secret.metadata.into_iter().collect()))
    }
}

fn not_found_status(status: &tonic::Status) -> bool {
    status.code() == Code::NotFound
}

impl ExternalStore {
    async fn read(&self, name: &ScopedName) -> Result<Secret> {
        let scoped_name = self.resolve(name).joined();
        let request = pb::GetSecretRequest {
            config: Some(self.config.clone()),
            secret: Some(pb::Secret {
                scoped_name: scoped_name.clone(),
                metadata: HashMap::new(),
                data: HashMap::new(),
            }),
        };

        let response = match self.client.get_secret(request).await {
            Ok(response) => response,
            Err(status) if not_found_status(&status) => {
                return Err(ConnectionError::not_found(scoped_name).wrap(Context::GetSecret));
            }
            Err(status) => return Err(ConnectionError::from(status).wrap(Context::GetSecret)),
        };

        let secret = response
            .secret
            .ok_or_else(|| ConnectionError::not_found(&scoped_name).wrap(Context::GetSecret))?;
        debug!(scoped_name = %scoped_name, keys = secret.data.len(), "Read plugin secret");
        Ok(from_plugin(secret, name))
    }

    async fn write(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        let current = ignore_not_found(self.read(&secret.scoped_name).await)?
            .unwrap_or_else(|| Secret::new(secret.scoped_name.clone()));

        let mut desired = secret.clone();
        apply_write_options(options, &current, &mut desired).context(Context::ApplySecret)?;

        let request = pb::ApplySecretRequest {
            config: Some(self.config.clone()),
            secret: Some(self.request_secret(&desired)),
        };
        let response = self.client.apply_secret(request).await.context(Context::ApplySecret)?;

        if response.changed {
            info!(scoped_name = %self.resolve(&secret.scoped_name), "Applied plugin secret");
        }
        Ok(response.changed)
    }

    async fn delete(
        &self,
        secret: &Secret,
        options: &[&dyn DeleteOption],
    ) -> Result<()> {
        let Some(current) = ignore_not_found(self.read(&secret.scoped_name).await)?
        else {
            return Ok(());
        };
        apply_delete_options(options, &current, secret).context(Context::DeleteSecret)?;

        let request = pb::DeleteKeysRequest {
            config: Some(self.config.clone()),
            secret: Some(self.request_secret(secret)),
        };
        match self.client.delete_keys(request).await {
            Ok(_) => {
                info!(scoped_name = %self.resolve(&secret.scoped_name), "Deleted plugin secret keys");
                Ok(())
            }
            Err(status) if not_found_status(&status) => Ok(()),
            Err(status) => Err(ConnectionError::from(status).wrap(Context::DeleteSecret)),
        }
    }
}

#[async_trait]
impl Store for ExternalStore {
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret> {
        self.read(name)
            .instrument(store_span!("read", StoreType::External, name))
            .await
            .inspect_err(|e| log_failure("read", e))
    }

    async fn write_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        self.write(secret, options)
            .instrument(store_span!("write", StoreType::External, secret.scoped_name))
            .await
            .inspect_err(|e| log_failure("write", e))
    }

    async fn delete_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn DeleteOption],
    ) -> Result<()> {
        self.delete(secret, options)
            .instrument(store_span!(
                "delete",
                StoreType::External,
                secret.scoped_name,
                keys = secret.data.len()
            ))
            .await
            .inspect_err(|e| log_failure("delete", e))
    }

    fn store_type(&self) -> StoreType {
        StoreType::External
    }
}
