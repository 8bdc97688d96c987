//! Secret object access and conversion to/from the canonical [`Secret`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, PostParams};
use kube::Api;

use crate::errors::Result;
use crate::store::secret::{ScopedName, Secret, SecretMetadata, DEFAULT_SECRET_TYPE};

/// Namespaced CRUD over core `Secret` objects.
///
/// `replace` carries the object's `resourceVersion`, so a concurrent update
/// surfaces as a 409 conflict from the API server.
#[async_trait]
pub trait SecretObjects: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>>;

    async fn create(&self, namespace: &str, object: &KubeSecret) -> Result<KubeSecret>;

    async fn replace(&self, namespace: &str, name: &str, object: &KubeSecret)
        -> Result<KubeSecret>;

    /// Delete an object; an absent object is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// [`SecretObjects`] backed by a live API server.
#[derive(Clone)]
pub struct KubeSecretObjects {
    client: kube::Client,
}

impl KubeSecretObjects {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<KubeSecret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretObjects for KubeSecretObjects {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, object: &KubeSecret) -> Result<KubeSecret> {
        Ok(self.api(namespace).create(&PostParams::default(), object).await?)
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        object: &KubeSecret,
    ) -> Result<KubeSecret> {
        Ok(self.api(namespace).replace(name, &PostParams::default(), object).await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Canonical view of a Secret object.
pub fn from_object(object: &KubeSecret, scoped_name: &ScopedName) -> Secret {
    let data = object
        .data
        .as_ref()
        .map(|data| data.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default();

    let mut metadata = SecretMetadata::from_labels(object.metadata.labels.clone().unwrap_or_default());
    metadata.annotations = object.metadata.annotations.clone().unwrap_or_default();
    metadata.secret_type = object.type_.clone();

    Secret::new(scoped_name.clone()).with_metadata(metadata).with_data(data)
}

/// Overlay the desired secret onto the current object (or a fresh one).
///
/// Data, labels and annotations are merged key by key; the desired type wins,
/// falling back to the current type and then [`DEFAULT_SECRET_TYPE`].
pub fn merge_object(current: Option<&KubeSecret>, namespace: &str, desired: &Secret) -> KubeSecret {
    let mut object = current.cloned().unwrap_or_else(|| KubeSecret {
        metadata: ObjectMeta {
            name: Some(desired.scoped_name.name.clone()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    });

    let metadata = desired.metadata.clone().unwrap_or_default();

    let labels = metadata.labels_with_owner();
    if !labels.is_empty() {
        object.metadata.labels.get_or_insert_with(BTreeMap::new).extend(labels);
    }
    if !metadata.annotations.is_empty() {
        object
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(metadata.annotations.clone());
    }

    let current_type = object.type_.take();
    object.type_ = metadata
        .secret_type
        .or(current_type)
        .or_else(|| Some(DEFAULT_SECRET_TYPE.to_string()));

    let data = object.data.get_or_insert_with(BTreeMap::new);
    for (key, value) in &desired.data {
        data.insert(key.clone(), ByteString(value.clone()));
    }

    object
}

/// Whether two objects carry the same type, data, labels and annotations.
pub fn same_content(a: &KubeSecret, b: &KubeSecret) -> bool {
    fn non_empty<T: Clone + Default + PartialEq>(v: &Option<T>) -> T {
        v.clone().unwrap_or_default()
    }

    a.type_ == b.type_
        && non_empty(&a.data) == non_empty(&b.data)
        && non_empty(&a.metadata.labels) == non_empty(&b.metadata.labels)
        && non_empty(&a.metadata.annotations) == non_empty(&b.metadata.annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::secret::{key_values, OWNER_UID_LABEL};

    fn existing() -> KubeSecret {
        KubeSecret {
            metadata: ObjectMeta {
                name: Some("db".into()),
                namespace: Some("ns".into()),
                labels: Some(BTreeMap::from([("app".to_string(), "billing".to_string())])),
                resource_version: Some("7".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("a".to_string(), ByteString(b"1".to_vec()))])),
            type_: Some("Opaque".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_object_extracts_owner_label() {
        let mut object = existing();
        object
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(OWNER_UID_LABEL.to_string(), "uid-1".to_string());

        let secret = from_object(&object, &ScopedName::new("db", "ns"));
        assert_eq!(secret.owner_uid(), Some("uid-1"));
        assert_eq!(secret.secret_type(), Some("Opaque"));
        assert_eq!(secret.data.get("a").unwrap(), b"1");
        assert!(!secret.metadata.unwrap().labels.contains_key(OWNER_UID_LABEL));
    }

    #[test]
    fn test_merge_fresh_object_uses_default_type() {
        let desired = Secret::new(ScopedName::new("db", "ns")).with_data(key_values([("a", "1")]));
        let object = merge_object(None, "ns", &desired);
        assert_eq!(object.metadata.name.as_deref(), Some("db"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(object.type_.as_deref(), Some(DEFAULT_SECRET_TYPE));
    }

    #[test]
    fn test_merge_overlays_data_and_keeps_resource_version() {
        let mut desired =
            Secret::new(ScopedName::new("db", "ns")).with_data(key_values([("b", "2")]));
        desired.set_owner_uid("uid-1");

        let current = existing();
        let merged = merge_object(Some(&current), "ns", &desired);
        let data = merged.data.as_ref().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(merged.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            merged.metadata.labels.as_ref().unwrap().get(OWNER_UID_LABEL).map(String::as_str),
            Some("uid-1")
        );
        assert!(!same_content(&current, &merged));
    }

    #[test]
    fn test_merge_without_changes_is_same_content() {
        let desired = Secret::new(ScopedName::new("db", "ns")).with_data(key_values([("a", "1")]));
        let current = existing();
        assert!(same_content(&current, &merge_object(Some(&current), "ns", &desired)));
    }
}
