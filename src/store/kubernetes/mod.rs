//! Kubernetes Secret store
//!
//! Stores connection secrets as core `Secret` objects, in the local cluster or
//! in a remote cluster reached through a kubeconfig from a credentials source.

mod objects;

pub use objects::{from_object, merge_object, same_content, KubeSecretObjects, SecretObjects};

use std::sync::Arc;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::{debug, info, Instrument};

use super::config::{KubernetesAuthConfig, StoreType};
use super::credentials::CredentialsExtractor;
use super::options::{apply_delete_options, apply_write_options, DeleteOption, WriteOption};
use super::registry::{BuildContext, StoreBuilderFn};
use super::secret::{ScopedName, Secret};
use super::{log_failure, Store};
use crate::store_span;
use crate::errors::{ConnectionError, Context, Result, ResultExt};

/// [`Store`] over Kubernetes Secret objects.
#[derive(Clone)]
pub struct KubernetesStore {
    objects: Arc<dyn SecretObjects>,
    default_scope: String,
}

impl std::fmt::Debug for KubernetesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesStore").field("default_scope", &self.default_scope).finish()
    }
}

impl KubernetesStore {
    pub fn new(objects: Arc<dyn SecretObjects>, default_scope: impl Into<String>) -> Self {
        Self { objects, default_scope: default_scope.into() }
    }

    /// Build a store from a StoreConfig: the remote cluster when auth is
    /// configured, the local client otherwise.
    pub async fn connect(ctx: BuildContext) -> Result<Self> {
        let auth = ctx.spec.kubernetes.as_ref().and_then(|k| k.auth.as_ref());
        let client = match auth {
            Some(auth) => remote_client(ctx.local_client.clone(), auth).await?,
            None => ctx.local_client.clone().ok_or_else(|| {
                ConnectionError::config(
                    "no local Kubernetes client available and no remote kubeconfig configured",
                )
            })?,
        };

        info!(
            default_scope = %ctx.spec.default_scope,
            remote = auth.is_some(),
            "Connected Kubernetes secret store"
        );

        Ok(Self::new(Arc::new(KubeSecretObjects::new(client)), ctx.spec.default_scope))
    }

    /// Registry builder for [`StoreType::Kubernetes`].
    pub fn builder() -> StoreBuilderFn {
        Arc::new(|ctx| {
            Box::pin(async move {
                let store = Self::connect(ctx).await?;
                Ok(Box::new(store) as Box<dyn Store>)
            })
        })
    }

    fn namespace<'a>(&'a self, name: &'a ScopedName) -> &'a str {
        if name.scope.is_empty() {
            &self.default_scope
        } else {
            &name.scope
        }
    }
}

async fn remote_client(
    local: Option<kube::Client>,
    auth: &KubernetesAuthConfig,
) -> Result<kube::Client> {
    let raw = CredentialsExtractor::new(local)
        .extract(&auth.kubeconfig)
        .await
        .context(Context::ExtractCredentials)?;
    let text = String::from_utf8(raw)
        .map_err(|_| ConnectionError::config("kubeconfig is not valid UTF-8"))?;

    let kubeconfig = Kubeconfig::from_yaml(&text)
        .map_err(|e| ConnectionError::config(format!("invalid kubeconfig: {}", e)))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ConnectionError::config(format!("invalid kubeconfig: {}", e)))?;

    kube::Client::try_from(config).context(Context::BuildClient)
}

impl KubernetesStore {
    async fn read(&self, name: &ScopedName) -> Result<Secret> {
        let namespace = self.namespace(name);
        let object = self
            .objects
            .get(namespace, &name.name)
            .await
            .context(Context::GetSecret)?
            .ok_or_else(|| {
                ConnectionError::not_found(format!("{}/{}", namespace, name.name))
                    .wrap(Context::GetSecret)
            })?;
        debug!(namespace = %namespace, name = %name.name, "Read connection secret");
        Ok(from_object(&object, name))
    }

    async fn write(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        let namespace = self.namespace(&secret.scoped_name).to_string();
        let name = secret.scoped_name.name.as_str();

        let existing = self.objects.get(&namespace, name).await.context(Context::GetSecret)?;
        let current = existing
            .as_ref()
            .map(|o| from_object(o, &secret.scoped_name))
            .unwrap_or_else(|| Secret::new(secret.scoped_name.clone()));

        let mut desired = secret.clone();
        apply_write_options(options, &current, &mut desired).context(Context::ApplySecret)?;

        let object = merge_object(existing.as_ref(), &namespace, &desired);
        match existing {
            None => {
                self.objects.create(&namespace, &object).await.context(Context::ApplySecret)?;
                info!(namespace = %namespace, name = %name, "Created connection secret");
                Ok(true)
            }
            Some(existing) if same_content(&existing, &object) => Ok(false),
            Some(_) => {
                self.objects
                    .replace(&namespace, name, &object)
                    .await
                    .context(Context::ApplySecret)?;
                info!(namespace = %namespace, name = %name, "Updated connection secret");
                Ok(true)
            }
        }
    }

    async fn delete(
        &self,
        secret: &Secret,
        options: &[&dyn DeleteOption],
    ) -> Result<()> {
        let namespace = self.namespace(&secret.scoped_name).to_string();
        let name = secret.scoped_name.name.as_str();

        let Some(mut existing) =
            self.objects.get(&namespace, name).await.context(Context::GetSecret)?
        else {
            return Ok(());
        };

        let current = from_object(&existing, &secret.scoped_name);
        apply_delete_options(options, &current, secret).context(Context::DeleteSecret)?;

        let data = existing.data.get_or_insert_with(Default::default);
        for key in secret.data.keys() {
            data.remove(key);
        }

        if secret.data.is_empty() || data.is_empty() {
            self.objects.delete(&namespace, name).await.context(Context::DeleteSecret)?;
            info!(namespace = %namespace, name = %name, "Deleted connection secret");
        } else {
            self.objects
                .replace(&namespace, name, &existing)
                .await
                .context(Context::DeleteSecret)?;
            info!(namespace = %namespace, name = %name, "Removed keys from connection secret");
        }
        Ok(())
    }
}

#[async_trait]
impl Store for KubernetesStore {
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret> {
        self.read(name)
            .instrument(store_span!("read", StoreType::Kubernetes, name))
            .await
            .inspect_err(|e| log_failure("read", e))
    }

    async fn write_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        self.write(secret, options)
            .instrument(store_span!("write", StoreType::Kubernetes, secret.scoped_name))
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
                StoreType::Kubernetes,
                secret.scoped_name,
                keys = secret.data.len()
            ))
            .await
            .inspect_err(|e| log_failure("delete", e))
    }

    fn store_type(&self) -> StoreType {
        StoreType::Kubernetes
    }
}
