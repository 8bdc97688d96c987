//! In-process store honouring the full [`Store`] contract.
//!
//! Used by tests and local dry runs; nothing is persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::config::StoreType;
use super::options::{apply_delete_options, apply_write_options, DeleteOption, WriteOption};
use super::secret::{ScopedName, Secret};
use super::Store;
use crate::errors::{ConnectionError, Context, Result, ResultExt};

/// Secrets in a map keyed by resolved scoped name. Writes merge key by key.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    secrets: Mutex<HashMap<ScopedName, Secret>>,
    default_scope: String,
    mutations: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_scope(default_scope: impl Into<String>) -> Self {
        Self { default_scope: default_scope.into(), ..Self::default() }
    }

    /// Store a secret as-is, bypassing options.
    pub fn insert(&self, secret: Secret) {
        let name = self.resolve(&secret.scoped_name);
        self.lock().insert(name, secret);
    }

    /// Stored secret, if any.
    pub fn get(&self, name: &ScopedName) -> Option<Secret> {
        self.lock().get(&self.resolve(name)).cloned()
    }

    /// Number of writes and deletes that changed state.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScopedName, Secret>> {
        self.secrets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, name: &ScopedName) -> ScopedName {
        if name.scope.is_empty() {
            ScopedName::new(name.name.clone(), self.default_scope.clone())
        } else {
            name.clone()
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn read_key_values(&self, name: &ScopedName) -> Result<Secret> {
        let resolved = self.resolve(name);
        self.lock()
            .get(&resolved)
            .cloned()
            .map(|mut secret| {
                secret.scoped_name = name.clone();
                secret
            })
            .ok_or_else(|| ConnectionError::not_found(resolved.joined()).wrap(Context::GetSecret))
    }

    async fn write_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn WriteOption],
    ) -> Result<bool> {
        let name = self.resolve(&secret.scoped_name);
        let mut secrets = self.lock();

        let current = secrets.get(&name).cloned().unwrap_or_else(|| Secret::new(name.clone()));
        let mut desired = secret.clone();
        apply_write_options(options, &current, &mut desired).context(Context::ApplySecret)?;

        let mut merged = current.clone();
        merged.scoped_name = name.clone();
        merged.data.extend(desired.data);
        if let Some(metadata) = desired.metadata {
            let target = merged.metadata_mut();
            target.labels.extend(metadata.labels);
            target.annotations.extend(metadata.annotations);
            if metadata.secret_type.is_some() {
                target.secret_type = metadata.secret_type;
            }
            if metadata.owner_uid.is_some() {
                target.owner_uid = metadata.owner_uid;
            }
        }

        if secrets.get(&name) == Some(&merged) {
            return Ok(false);
        }
        secrets.insert(name, merged);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_key_values(
        &self,
        secret: &Secret,
        options: &[&dyn DeleteOption],
    ) -> Result<()> {
        let name = self.resolve(&secret.scoped_name);
        let mut secrets = self.lock();
        let Some(current) = secrets.get(&name).cloned() else {
            return Ok(());
        };
        apply_delete_options(options, &current, secret).context(Context::DeleteSecret)?;

        let mut remainder = current.clone();
        for key in secret.data.keys() {
            remainder.data.remove(key);
        }
        if secret.data.is_empty() || remainder.data.is_empty() {
            secrets.remove(&name);
        } else if remainder == current {
            return Ok(());
        } else {
            secrets.insert(name, remainder);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn store_type(&self) -> StoreType {
        StoreType::Other("Memory".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::options::MustBeOwnedBy;
    use crate::store::secret::key_values;

    fn secret(pairs: &[(&str, &str)]) -> Secret {
        Secret::new(ScopedName::new("db", "")).with_data(key_values(pairs.iter().copied()))
    }

    #[tokio::test]
    async fn test_write_is_additive_and_idempotent() {
        let store = InMemoryStore::with_default_scope("ns");
        assert!(store.write_key_values(&secret(&[("a", "1")]), &[]).await.unwrap());
        assert!(store.write_key_values(&secret(&[("b", "2")]), &[]).await.unwrap());
        assert!(!store.write_key_values(&secret(&[("a", "1")]), &[]).await.unwrap());

        let stored = store.get(&ScopedName::new("db", "ns")).unwrap();
        assert_eq!(stored.data.len(), 2);
        assert_eq!(store.mutations(), 2);
    }

    #[tokio::test]
    async fn test_read_keeps_requested_name() {
        let store = InMemoryStore::with_default_scope("ns");
        store.insert(secret(&[("a", "1")]));
        let read = store.read_key_values(&ScopedName::new("db", "")).await.unwrap();
        assert_eq!(read.scoped_name, ScopedName::new("db", ""));
    }

    #[tokio::test]
    async fn test_guarded_delete() {
        let store = InMemoryStore::new();
        let mut owned = secret(&[("a", "1")]);
        owned.set_owner_uid("y");
        store.insert(owned);

        let err = store.delete_key_values(&secret(&[]), &[&MustBeOwnedBy::new("x")]).await;
        assert!(err.unwrap_err().is_conflict());
        assert_eq!(store.len(), 1);

        store.delete_key_values(&secret(&[]), &[&MustBeOwnedBy::new("y")]).await.unwrap();
        assert!(store.is_empty());
    }
}
