//! Resources that own connection secrets and say where to publish them.

use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};

use crate::errors::{ConnectionError, Context, Result, ResultExt};
use crate::store::SecretMetadata;

/// Names the StoreConfig a connection secret is published through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfigReference {
    pub name: String,
}

/// Publish target of a connection secret owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishConnectionDetailsTo {
    /// Secret name; the scope comes from the owner's namespace.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SecretMetadata>,

    /// StoreConfig to publish through. Absent or empty means the default one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<StoreConfigReference>,
}

impl PublishConnectionDetailsTo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config_ref = Some(StoreConfigReference { name: config.into() });
        self
    }

    pub fn with_metadata(mut self, metadata: SecretMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Referenced StoreConfig name, if one is set.
    pub fn store_config(&self) -> Option<&str> {
        self.config_ref.as_ref().map(|r| r.name.as_str()).filter(|n| !n.is_empty())
    }
}

/// A resource whose connection details are published to a secret store.
pub trait ConnectionSecretOwner: Send + Sync {
    /// Stable identity stamped onto published secrets.
    fn uid(&self) -> &str;

    /// Owner namespace; empty for cluster-scoped owners.
    fn namespace(&self) -> &str;

    /// Where to publish, or `None` when the owner does not publish.
    fn publish_connection_details_to(&self) -> Option<&PublishConnectionDetailsTo>;
}

/// Plain owner record, also decodable from any Kubernetes object that
/// carries `spec.publishConnectionDetailsTo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOwner {
    uid: String,
    namespace: String,
    publish_to: Option<PublishConnectionDetailsTo>,
}

impl ResourceOwner {
    pub fn new(uid: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { uid: uid.into(), namespace: namespace.into(), publish_to: None }
    }

    pub fn publishing_to(mut self, target: PublishConnectionDetailsTo) -> Self {
        self.publish_to = Some(target);
        self
    }
}

impl ConnectionSecretOwner for ResourceOwner {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn publish_connection_details_to(&self) -> Option<&PublishConnectionDetailsTo> {
        self.publish_to.as_ref()
    }
}

impl TryFrom<&DynamicObject> for ResourceOwner {
    type Error = ConnectionError;

    fn try_from(object: &DynamicObject) -> Result<Self> {
        let uid = object
            .metadata
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| ConnectionError::config("owner object has no uid"))?;

        let publish_to = match object.data.pointer("/spec/publishConnectionDetailsTo") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<PublishConnectionDetailsTo>(value.clone())
                    .context(Context::ParseOwner)?,
            ),
        };

        Ok(Self { uid, namespace: object.metadata.namespace.clone().unwrap_or_default(), publish_to })
    }
}
