//! KV engine clients for v1 (flat) and v2 (versioned, with metadata) mounts.
//!
//! Writes are read-modify-write: the caller passes the secret it read, the
//! desired values are overlaid onto it key by key and nothing is written when
//! no value changed.
//!
//! On v2 the data write goes first and carries the CAS token of the observed
//! version. Custom metadata has no CAS, so it is written only after the data
//! write succeeded or when the secret already holds data.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::decode::{decode_v1, decode_v2, KvSecret};
use super::logical::LogicalClient;
use crate::errors::{ConnectionError, Context, Result, ResultExt};
use crate::store::config::KvVersion;

/// Secret-level operations over one KV mount.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Read a secret; a path that was never written is a not-found error.
    async fn get(&self, path: &str) -> Result<KvSecret>;

    /// Merge `desired` into `existing` and write what changed.
    ///
    /// Returns whether anything was written.
    async fn apply(&self, path: &str, existing: Option<&KvSecret>, desired: &KvSecret)
        -> Result<bool>;

    /// Overwrite the data with exactly `data`, guarded by the observed version on v2.
    async fn replace(
        &self,
        path: &str,
        existing: &KvSecret,
        data: BTreeMap<String, String>,
    ) -> Result<()>;

    /// Remove the secret (all versions and metadata on v2).
    async fn delete(&self, path: &str) -> Result<()>;

    fn version(&self) -> KvVersion;
}

/// Client for the mount's engine version.
pub fn kv_client(
    logical: Arc<dyn LogicalClient>,
    mount_path: &str,
    version: KvVersion,
) -> Arc<dyn KvClient> {
    let mount_path = mount_path.trim_matches('/').to_string();
    match version {
        KvVersion::V1 => Arc::new(KvV1Client { logical, mount_path }),
        KvVersion::V2 => Arc::new(KvV2Client { logical, mount_path }),
    }
}

/// Overlay `new` onto `existing`, reporting whether any value differs.
pub fn merge_additive(
    existing: Option<&BTreeMap<String, String>>,
    new: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, bool) {
    let mut merged = existing.cloned().unwrap_or_default();
    let mut changed = false;
    for (key, value) in new {
        if merged.get(key) != Some(value) {
            merged.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    (merged, changed)
}

/// v1 write body, or `None` when the merge changes nothing.
pub fn data_payload_v1(existing: Option<&KvSecret>, desired: &KvSecret) -> Option<Value> {
    let (merged, changed) = merge_additive(existing.map(|e| &e.data), &desired.data);
    changed.then(|| json!(merged))
}

/// v2 data write body with the CAS token of the observed version.
pub fn data_payload_v2(existing: Option<&KvSecret>, desired: &KvSecret) -> Option<Value> {
    let (merged, changed) = merge_additive(existing.map(|e| &e.data), &desired.data);
    changed.then(|| {
        json!({
            "data": merged,
            "options": {"cas": existing.map_or(0, KvSecret::cas)},
        })
    })
}

/// v2 metadata write body, or `None` when custom metadata is unchanged.
pub fn metadata_payload(existing: Option<&KvSecret>, desired: &KvSecret) -> Option<Value> {
    let (merged, changed) = merge_additive(existing.map(|e| &e.custom_meta), &desired.custom_meta);
    changed.then(|| json!({"custom_metadata": merged}))
}

struct KvV1Client {
    logical: Arc<dyn LogicalClient>,
    mount_path: String,
}

impl KvV1Client {
    fn data_path(&self, path: &str) -> String {
        format!("{}/{}", self.mount_path, path)
    }
}

#[async_trait]
impl KvClient for KvV1Client {
    async fn get(&self, path: &str) -> Result<KvSecret> {
        let full = self.data_path(path);
        match self.logical.read(&full).await.context(Context::ReadSecret)? {
            Some(data) => decode_v1(&data).context(Context::ParseSecret),
            None => Err(ConnectionError::not_found(full)),
        }
    }

    async fn apply(
        &self,
        path: &str,
        existing: Option<&KvSecret>,
        desired: &KvSecret,
    ) -> Result<bool> {
        let Some(payload) = data_payload_v1(existing, desired) else {
            debug!(path = %path, "KV v1 secret unchanged");
            return Ok(false);
        };
        self.logical.write(&self.data_path(path), payload).await.context(Context::WriteData)?;
        Ok(true)
    }

    async fn replace(
        &self,
        path: &str,
        _existing: &KvSecret,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        self.logical.write(&self.data_path(path), json!(data)).await.context(Context::WriteData)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.logical.delete(&self.data_path(path)).await
    }

    fn version(&self) -> KvVersion {
        KvVersion::V1
    }
}

struct KvV2Client {
    logical: Arc<dyn LogicalClient>,
    mount_path: String,
}

impl KvV2Client {
    fn data_path(&self, path: &str) -> String {
        format!("{}/data/{}", self.mount_path, path)
    }

    fn metadata_path(&self, path: &str) -> String {
        format!("{}/metadata/{}", self.mount_path, path)
    }
}

#[async_trait]
impl KvClient for KvV2Client {
    async fn get(&self, path: &str) -> Result<KvSecret> {
        let full = self.data_path(path);
        match self.logical.read(&full).await.context(Context::ReadSecret)? {
            Some(data) => decode_v2(&data).context(Context::ParseSecret),
            None => Err(ConnectionError::not_found(full)),
        }
    }

    async fn apply(
        &self,
        path: &str,
        existing: Option<&KvSecret>,
        desired: &KvSecret,
    ) -> Result<bool> {
        let data = data_payload_v2(existing, desired);
        let metadata = metadata_payload(existing, desired);

        let mut changed = false;
        if let Some(data) = data {
            info!(path = %path, cas = existing.map_or(0, KvSecret::cas), "Writing KV v2 secret data");
            self.logical.write(&self.data_path(path), data).await.context(Context::WriteData)?;
            changed = true;
        }
        let has_data = changed || existing.is_some_and(|e| !e.data.is_empty());
        if let Some(metadata) = metadata.filter(|_| has_data) {
            self.logical
                .write(&self.metadata_path(path), metadata)
                .await
                .context(Context::WriteMetadata)?;
            changed = true;
        }
        Ok(changed)
    }

    async fn replace(
        &self,
        path: &str,
        existing: &KvSecret,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let body = json!({"data": data, "options": {"cas": existing.cas()}});
        self.logical.write(&self.data_path(path), body).await.context(Context::WriteData)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.logical.delete(&self.metadata_path(path)).await
    }

    fn version(&self) -> KvVersion {
        KvVersion::V2
    }
}
