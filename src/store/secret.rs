//! The canonical connection secret record shared by every store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label under which backends without a native owner field persist the owner UID.
pub const OWNER_UID_LABEL: &str = "secrets.connstore.io/owner-uid";

/// Secret type written to Kubernetes when the caller declares none.
pub const DEFAULT_SECRET_TYPE: &str = "connection.connstore.io/v1alpha1";

/// Opaque key/value payload of a connection secret.
pub type KeyValues = BTreeMap<String, Vec<u8>>;

/// A `(name, scope)` pair identifying a secret within a backend partition.
///
/// An empty scope means "use the backend default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedName {
    pub name: String,
    #[serde(default)]
    pub scope: String,
}

impl ScopedName {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self { name: name.into(), scope: scope.into() }
    }

    /// `scope/name`, or `name` when unscoped.
    pub fn joined(&self) -> String {
        if self.scope.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.scope, self.name)
        }
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Best-effort metadata; not every backend supports every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
}

impl SecretMetadata {
    /// Labels with the owner UID folded in under [`OWNER_UID_LABEL`].
    pub fn labels_with_owner(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        if let Some(uid) = &self.owner_uid {
            labels.insert(OWNER_UID_LABEL.to_string(), uid.clone());
        }
        labels
    }

    /// Inverse of [`labels_with_owner`](Self::labels_with_owner).
    pub fn from_labels(mut labels: BTreeMap<String, String>) -> Self {
        let owner_uid = labels.remove(OWNER_UID_LABEL);
        Self { labels, owner_uid, ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
            && self.annotations.is_empty()
            && self.secret_type.is_none()
            && self.owner_uid.is_none()
    }
}

/// A connection secret: scoped name, optional metadata and opaque values.
///
/// `Debug` prints key names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret {
    pub scoped_name: ScopedName,
    pub metadata: Option<SecretMetadata>,
    pub data: KeyValues,
}

impl Secret {
    pub fn new(scoped_name: ScopedName) -> Self {
        Self { scoped_name, metadata: None, data: KeyValues::new() }
    }

    pub fn with_data(mut self, data: KeyValues) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, metadata: SecretMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn owner_uid(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.owner_uid.as_deref())
    }

    pub fn secret_type(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.secret_type.as_deref())
    }

    /// Metadata, created empty if absent.
    pub fn metadata_mut(&mut self) -> &mut SecretMetadata {
        self.metadata.get_or_insert_with(SecretMetadata::default)
    }

    pub fn set_owner_uid(&mut self, uid: impl Into<String>) {
        self.metadata_mut().owner_uid = Some(uid.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("scoped_name", &self.scoped_name)
            .field("metadata", &self.metadata)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build [`KeyValues`] from string pairs.
pub fn key_values<I, K, V>(pairs: I) -> KeyValues
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<[u8]>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.as_ref().to_vec())).collect()
}
