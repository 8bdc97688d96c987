//! StoreConfig `spec` types.
//!
//! The StoreConfig custom resource is owned by the surrounding controller; this
//! crate only decodes its `spec` into these types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backend type tag of a StoreConfig.
///
/// Unknown tags are preserved as [`StoreType::Other`] so caller-registered
/// builders can dispatch on plugin-defined types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StoreType {
    #[default]
    Kubernetes,
    Vault,
    External,
    Other(String),
}

impl StoreType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Kubernetes => "Kubernetes",
            Self::Vault => "Vault",
            Self::External => "External",
            Self::Other(tag) => tag,
        }
    }
}

impl FromStr for StoreType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Kubernetes" => Self::Kubernetes,
            "Vault" => Self::Vault,
            "External" | "Plugin" => Self::External,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for StoreType {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<StoreType> for String {
    fn from(value: StoreType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded `spec` of a StoreConfig object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfigSpec {
    #[serde(rename = "type", default)]
    pub store_type: StoreType,

    /// Scope used when a secret names none (namespace, Vault parent path, ...).
    #[serde(default)]
    pub default_scope: String,

    #[serde(default)]
    pub kubernetes: Option<KubernetesStoreConfig>,

    #[serde(default)]
    pub vault: Option<VaultStoreConfig>,

    #[serde(default, alias = "external")]
    pub plugin: Option<ExternalStoreConfig>,
}

/// Where to read a credential from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum CredentialsSource {
    #[default]
    None,
    Secret {
        #[serde(rename = "secretRef")]
        secret_ref: SecretKeySelector,
    },
    Environment {
        env: EnvSelector,
    },
    Filesystem {
        fs: FsSelector,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSelector {
    pub path: String,
}

/// Kubernetes backend configuration. No auth means the local API server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesStoreConfig {
    #[serde(default)]
    pub auth: Option<KubernetesAuthConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesAuthConfig {
    /// Source of a kubeconfig for the remote cluster.
    #[serde(default)]
    pub kubeconfig: CredentialsSource,
}

/// KV secrets engine version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvVersion {
    V1,
    #[default]
    V2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultAuthMethod {
    #[default]
    Token,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAuthConfig {
    #[serde(default)]
    pub method: VaultAuthMethod,
    #[serde(default)]
    pub token: CredentialsSource,
}

/// Vault KV backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStoreConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    pub server: String,

    /// KV engine mount path (default: "secret")
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    #[serde(default)]
    pub version: KvVersion,

    /// Vault namespace (for Enterprise multi-tenancy)
    #[serde(default)]
    pub namespace: Option<String>,

    /// PEM CA bundle used to verify the server.
    #[serde(default)]
    pub ca_bundle: Option<CredentialsSource>,

    #[serde(default)]
    pub auth: VaultAuthConfig,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_mount_path() -> String {
    "secret".to_string()
}

impl VaultStoreConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

/// Identifies the StoreConfig that authorized a plugin connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// External plugin backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalStoreConfig {
    /// gRPC endpoint of the plugin (e.g., "https://ess-plugin-vault:4040")
    pub endpoint: String,

    pub config_ref: ConfigReference,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ExternalStoreConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_type_parse() {
        assert_eq!("Vault".parse::<StoreType>().unwrap(), StoreType::Vault);
        assert_eq!("Plugin".parse::<StoreType>().unwrap(), StoreType::External);
        assert_eq!(
            "AwsSecretsManager".parse::<StoreType>().unwrap(),
            StoreType::Other("AwsSecretsManager".into())
        );
        assert_eq!(StoreType::Kubernetes.to_string(), "Kubernetes");
    }

    #[test]
    fn test_spec_defaults_to_kubernetes() {
        let spec: StoreConfigSpec =
            serde_json::from_value(serde_json::json!({"defaultScope": "connections"}))
                .unwrap();
        assert_eq!(spec.store_type, StoreType::Kubernetes);
        assert_eq!(spec.default_scope, "connections");
    }

    #[test]
    fn test_vault_spec_from_yaml() {
        let yaml = r#"
type: Vault
defaultScope: connections
vault:
  server: http://vault.vault-system:8200
  mountPath: secret/
  version: v1
  auth:
    method: Token
    token:
      source: Filesystem
      fs:
        path: /vault/secrets/token
"#;
        let spec: StoreConfigSpec = serde_yaml::from_str(yaml).unwrap();
        let vault = spec.vault.unwrap();
        assert_eq!(spec.store_type, StoreType::Vault);
        assert_eq!(vault.version, KvVersion::V1);
        assert_eq!(vault.mount_path, "secret/");
        assert_eq!(
            vault.auth.token,
            CredentialsSource::Filesystem { fs: FsSelector { path: "/vault/secrets/token".into() } }
        );
    }

    #[test]
    fn test_kubernetes_secret_source() {
        let spec: StoreConfigSpec = serde_json::from_value(serde_json::json!({
            "type": "Kubernetes",
            "kubernetes": {"auth": {"kubeconfig": {
                "source": "Secret",
                "secretRef": {"name": "remote", "namespace": "ops", "key": "kubeconfig"}
            }}}
        }))
        .unwrap();
        let auth = spec.kubernetes.unwrap().auth.unwrap();
        assert!(matches!(auth.kubeconfig, CredentialsSource::Secret { .. }));
    }

    #[test]
    fn test_plugin_alias() {
        let spec: StoreConfigSpec = serde_json::from_value(serde_json::json!({
            "type": "External",
            "external": {
                "endpoint": "https://ess:4040",
                "configRef": {"apiVersion": "v1", "kind": "VaultConfig", "name": "vault"}
            }
        }))
        .unwrap();
        assert_eq!(spec.plugin.unwrap().config_ref.kind, "VaultConfig");
    }
}
