//! Credential extraction from the sources a StoreConfig may reference.

use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::Api;
use tracing::debug;

use super::config::CredentialsSource;
use crate::errors::{ConnectionError, Context, Result, ResultExt};

/// Reads credential bytes from a Kubernetes secret key, the process
/// environment, or a file.
///
/// The local client is only needed for [`CredentialsSource::Secret`].
#[derive(Clone, Default)]
pub struct CredentialsExtractor {
    local: Option<kube::Client>,
}

impl std::fmt::Debug for CredentialsExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsExtractor")
            .field("local_client", &self.local.as_ref().map(|_| "[kube::Client]"))
            .finish()
    }
}

impl CredentialsExtractor {
    pub fn new(local: Option<kube::Client>) -> Self {
        Self { local }
    }

    pub async fn extract(&self, source: &CredentialsSource) -> Result<Vec<u8>> {
        match source {
            CredentialsSource::None => {
                Err(ConnectionError::config("credentials source is None"))
            }
            CredentialsSource::Secret { secret_ref } => {
                let client = self.local.clone().ok_or_else(|| {
                    ConnectionError::config(
                        "a local Kubernetes client is required to read credentials from a secret",
                    )
                })?;
                debug!(
                    name = %secret_ref.name,
                    namespace = %secret_ref.namespace,
                    key = %secret_ref.key,
                    "Reading credentials from Kubernetes secret"
                );
                let api: Api<KubeSecret> = Api::namespaced(client, &secret_ref.namespace);
                let secret = api
                    .get_opt(&secret_ref.name)
                    .await
                    .context(Context::ExtractCredentials)?
                    .ok_or_else(|| {
                        ConnectionError::not_found(format!(
                            "{}/{}",
                            secret_ref.namespace, secret_ref.name
                        ))
                        .wrap(Context::ExtractCredentials)
                    })?;
                secret
                    .data
                    .and_then(|mut data| data.remove(&secret_ref.key))
                    .map(|bytes| bytes.0)
                    .ok_or_else(|| {
                        ConnectionError::config(format!(
                            "secret {}/{} has no key {}",
                            secret_ref.namespace, secret_ref.name, secret_ref.key
                        ))
                    })
            }
            CredentialsSource::Environment { env } => std::env::var(&env.name)
                .map(String::into_bytes)
                .map_err(|_| {
                    ConnectionError::config(format!(
                        "environment variable {} is not set",
                        env.name
                    ))
                }),
            CredentialsSource::Filesystem { fs } => {
                tokio::fs::read(&fs.path).await.context(Context::ExtractCredentials)
            }
        }
    }
}
