//! Vault KV store
//!
//! Connection secrets live at `<mount>/<scope>/<name>` (v1) or
//! `<mount>/data/<scope>/<name>` with custom metadata at
//! `<mount>/metadata/<scope>/<name>` (v2).
//!
//! ## Ownership
//!
//! On v2 the owner UID and labels are kept in the secret's custom metadata.
//! v1 has no metadata, so secrets written there never record an owner.

pub mod decode;
pub mod kv;
pub mod logical;

#[cfg(test)]
pub(crate) mod fake;

pub use decode::KvSecret;
pub use kv::{kv_client, KvClient};
pub use logical::{HttpLogicalClient, LogicalClient};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, Instrument};

use super::config::{KvVersion, StoreType, VaultAuthMethod};
use super::credentials::CredentialsExtractor;
use super::options::{apply_delete_options, apply_write_options, DeleteOption, WriteOption};
use super::registry::{BuildContext, StoreBuilderFn};
use super::secret::{ScopedName, Secret, SecretMetadata};
use super::types::SecretString;
use super::{log_failure, Store};
use crate::store_span;
use crate::errors::{ignore_not_found, ConnectionError, Context, Result, ResultExt};

/// [`Store`] over a Vault KV mount.
#[derive(Clone)]
pub struct VaultStore {
    kv: Arc<dyn KvClient>,
    default_scope: String,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("version", &self.kv.version())
            .field("default_scope", &self.default_scope)
            .finish()
    }
}

impl VaultStore {
    pub fn new(kv: Arc<dyn KvClient>, default_scope: impl Into<String>) -> Self {
        Self { kv, default_scope: default_scope.into() }
    }

    /// Build a store from the StoreConfig's `vault` section.
    pub async fn connect(ctx: BuildContext) -> Result<Self> {
        let config = ctx
            .spec
            .vault
            .as_ref()
            .ok_or_else(|| ConnectionError::config("store config has no vault section"))?;
        let extractor = CredentialsExtractor::new(ctx.local_client.clone());

        let token = match config.auth.method {
            VaultAuthMethod::Token => {
                let raw = extractor
                    .extract(&config.auth.token)
                    .await
                    .context(Context::ExtractCredentials)?;
                SecretString::from_credential_bytes(&raw).ok_or_else(|| {
                    ConnectionError::config("vault token is empty or not valid UTF-8")
                })?
            }
        };

        let ca_bundle = match &config.ca_bundle {
            Some(source) => {
                Some(extractor.extract(source).await.context(Context::ExtractCredentials)?)
            }
            None => None,
        };

        let logical = HttpLogicalClient::new(
            &config.server,
            token,
            config.namespace.clone(),
            ca_bundle.as_deref(),
            config.timeout(),
        )?;

        info!(
            server = %config.server,
            mount_path = %config.mount_path,
            version = ?config.version,
            "Connected Vault secret store"
        );

        Ok(Self::new(
            kv_client(Arc::new(logical), &config.mount_path, config.version),
            ctx.spec.default_scope.clone(),
        ))
    }

    /// Registry builder for [`StoreType::Vault`].
    pub fn builder() -> StoreBuilderFn {
        Arc::new(|ctx| {
            Box::pin(async move {
                let store = Self::connect(ctx).await?;
                Ok(Box::new(store) as Box<dyn Store>)
            })
        })
    }

    /// Path of a secret below the mount.
    fn path(&self, name: &ScopedName) -> String {
        let scope = if name.scope.is_empty() { &self.default_scope } else { &name.scope };
        if scope.is_empty() {
            name.name.clone()
        } else {
            format!("{}/{}", scope.trim_end_matches('/'), name.name)
        }
    }

    async fn current(&self, path: &str) -> Result<Option<KvSecret>> {
        ignore_not_found(self.kv.get(path).await).context(Context::GetSecret)
    }
}

/// Canonical view of a KV secret.
fn from_kv(kv: &KvSecret, name: &ScopedName) -> Secret {
    let data = kv.data.iter().map(|(k, v)| (k.clone(), v.clone().into_bytes())).collect();
    let secret = Secret::new(name.clone()).with_data(data);
    if kv.custom_meta.is_empty() {
        secret
    } else {
        secret.with_metadata(SecretMetadata::from_labels(kv.custom_meta.clone()))
    }
}

/// KV view of a secret. Vault stores strings, so values must be UTF-8.
fn to_kv(secret: &Secret) -> Result<KvSecret> {
    let data = secret
        .data
        .iter()
        .map(|(key, value)| {
            String::from_utf8(value.clone())
                .map(|v| (key.clone(), v))
                .map_err(|_| ConnectionError::invalid_value(key, "value is not valid UTF-8"))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    let custom_meta =
        secret.metadata.as_ref().map(SecretMetadata::labels_with_owner).unwrap_or_default();
    Ok(KvSecret::new(data, custom_meta))
}

impl VaultStore {
    async fn read(&self, name: &ScopedName) -> Result<Secret> {
        let path = self.path(name);
        let kv = self.kv.get(&path).await.context(Context::GetSecret)?;
        debug!(path = %path, keys = kv.data.len(), "Read Vault secret");
        Ok(from_kv(&kv, name))
    }

    async fn write(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        let path = self.path(&secret.scoped_name);
        let existing = self.current(&path).await?;

        let current = existing
            .as_ref()
            .map(|kv| from_kv(kv, &secret.scoped_name))
            .unwrap_or_else(|| Secret::new(secret.scoped_name.clone()));
        let mut desired = secret.clone();
        apply_write_options(options, &current, &mut desired).context(Context::ApplySecret)?;

        let desired = to_kv(&desired).context(Context::ApplySecret)?;
        if self.kv.version() == KvVersion::V1 && !desired.custom_meta.is_empty() {
            debug!(path = %path, "KV v1 has no metadata; labels and owner are not stored");
        }

        let changed =
            self.kv.apply(&path, existing.as_ref(), &desired).await.context(Context::ApplySecret)?;
        if changed {
            info!(path = %path, "Wrote Vault secret");
        }
        Ok(changed)
    }

    async fn delete(
        &self,
        secret: &Secret,
        options: &[&dyn DeleteOption],
    ) -> Result<()> {
        let path = self.path(&secret.scoped_name);
        let Some(existing) = self.current(&path).await? else {
            return Ok(());
        };

        let current = from_kv(&existing, &secret.scoped_name);
        apply_delete_options(options, &current, secret).context(Context::DeleteSecret)?;

        let mut remainder = existing.data.clone();
        for key in secret.data.keys() {
            remainder.remove(key);
        }

        if secret.data.is_empty() || remainder.is_empty() {
            self.kv.delete(&path).await.context(Context::DeleteSecret)?;
            info!(path = %path, "Deleted Vault secret");
        } else if remainder.len() != existing.data.len() {
            self.kv.replace(&path, &existing, remainder).await.context(Context::DeleteSecret)?;
            info!(path = %path, "Removed keys from Vault secret");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for VaultStore {
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret> {
        self.read(name)
            .instrument(store_span!("read", StoreType::Vault, name))
            .await
            .inspect_err(|e| log_failure("read", e))
    }

    async fn write_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        self.write(secret, options)
            .instrument(store_span!("write", StoreType::Vault, secret.scoped_name))
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
                StoreType::Vault,
                secret.scoped_name,
                keys = secret.data.len()
            ))
            .await
            .inspect_err(|e| log_failure("delete", e))
    }

    fn store_type(&self) -> StoreType {
        StoreType::Vault
    }
}
