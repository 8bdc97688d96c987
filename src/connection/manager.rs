//! # Details Manager
//!
//! Publishes, unpublishes, fetches and propagates the connection details of
//! owner resources through whichever store their StoreConfig selects.

use std::sync::Arc;

use tracing::{debug, field, info, Instrument, Span};

use super::owner::{ConnectionSecretOwner, PublishConnectionDetailsTo};
use super::resolver::{KubeStoreConfigResolver, StoreConfigResolver};
use crate::config::ManagerSettings;
use crate::connection_span;
use crate::errors::{ConnectionError, Context, Result, ResultExt};
use crate::store::plugin::ExternalStore;
use crate::store::secret::DEFAULT_SECRET_TYPE;
use crate::store::{
    BuildContext, KeyValues, MustBeOwnedBy, ScopedName, Secret, Store, StoreRegistry, StoreType,
};

/// Default StoreConfig name used when a publish target references none.
pub const DEFAULT_STORE_CONFIG: &str = "default";

/// Manages connection secrets on behalf of owner resources.
#[derive(Clone)]
pub struct DetailsManager {
    resolver: Arc<dyn StoreConfigResolver>,
    registry: StoreRegistry,
    local_client: Option<kube::Client>,
    default_store_config: String,
}

impl std::fmt::Debug for DetailsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailsManager")
            .field("registry", &self.registry)
            .field("local_client", &self.local_client.is_some())
            .field("default_store_config", &self.default_store_config)
            .finish()
    }
}

impl DetailsManager {
    pub fn new(resolver: Arc<dyn StoreConfigResolver>, registry: StoreRegistry) -> Self {
        Self {
            resolver,
            registry,
            local_client: None,
            default_store_config: DEFAULT_STORE_CONFIG.to_string(),
        }
    }

    /// Manager reading StoreConfigs from the local cluster, with the
    /// Kubernetes, Vault and External builders registered.
    pub fn from_settings(client: kube::Client, settings: &ManagerSettings) -> Self {
        let resolver = KubeStoreConfigResolver::new(client.clone(), &settings.store_config_kind);

        Self::new(Arc::new(resolver), default_registry(settings))
            .with_local_client(client)
            .with_default_store_config(settings.default_store_config.clone())
    }

    pub fn with_local_client(mut self, client: kube::Client) -> Self {
        self.local_client = Some(client);
        self
    }

    pub fn with_default_store_config(mut self, name: impl Into<String>) -> Self {
        self.default_store_config = name.into();
        self
    }

    /// Resolve a StoreConfig by name and build its store.
    pub async fn connect(&self, store_config: &str) -> Result<Box<dyn Store>> {
        let spec = self.resolver.resolve(store_config).await.context(Context::GetStoreConfig)?;
        debug!(store_config = %store_config, store_type = %spec.store_type, "Connecting store");
        self.registry
            .build(BuildContext::new(self.local_client.clone(), spec))
            .await
            .context(Context::BuildStore)
    }

    /// Connect the target's store, recording the StoreConfig name under
    /// `span_field` of the current span.
    async fn connect_target(
        &self,
        target: &PublishConnectionDetailsTo,
        span_field: &'static str,
    ) -> Result<Box<dyn Store>> {
        let store_config = target.store_config().unwrap_or(&self.default_store_config);
        Span::current().record(span_field, field::display(store_config));
        self.connect(store_config).await
    }

    /// Write the owner's connection details to its publish target.
    ///
    /// Returns `Ok(false)` without touching any store when the owner does not
    /// publish.
    pub async fn publish_connection(
        &self,
        owner: &dyn ConnectionSecretOwner,
        details: &KeyValues,
    ) -> Result<bool> {
        let Some(target) = owner.publish_connection_details_to() else {
            return Ok(false);
        };

        async {
            let store = self.connect_target(target, "store_config").await?;
            let secret = owned_secret(owner, target, details.clone());
            let changed =
                store.write_key_values(&secret, &[&MustBeOwnedBy::new(owner.uid())]).await?;
            info!(secret = %secret.scoped_name, changed, "Published connection details");
            Ok::<_, ConnectionError>(changed)
        }
        .instrument(connection_span!("publish", owner.uid()))
        .await
        .context(Context::PublishConnection)
    }

    /// Remove the owner's connection details from its publish target.
    ///
    /// Only the given keys are removed; with no keys the whole secret goes.
    pub async fn unpublish_connection(
        &self,
        owner: &dyn ConnectionSecretOwner,
        details: &KeyValues,
    ) -> Result<()> {
        let Some(target) = owner.publish_connection_details_to() else {
            return Ok(());
        };

        async {
            let store = self.connect_target(target, "store_config").await?;
            let secret = Secret::new(ScopedName::new(&target.name, owner.namespace()))
                .with_data(details.clone());
            store.delete_key_values(&secret, &[&MustBeOwnedBy::new(owner.uid())]).await?;
            info!(secret = %secret.scoped_name, keys = details.len(), "Unpublished connection details");
            Ok::<_, ConnectionError>(())
        }
        .instrument(connection_span!("unpublish", owner.uid()))
        .await
        .context(Context::UnpublishConnection)
    }

    /// Read the owner's published connection details.
    ///
    /// `Ok(None)` means the owner does not publish; an absent secret is a
    /// not-found error.
    pub async fn fetch_connection(
        &self,
        owner: &dyn ConnectionSecretOwner,
    ) -> Result<Option<KeyValues>> {
        let Some(target) = owner.publish_connection_details_to() else {
            return Ok(None);
        };

        async {
            let store = self.connect_target(target, "store_config").await?;
            let secret =
                store.read_key_values(&ScopedName::new(&target.name, owner.namespace())).await?;
            Ok::<_, ConnectionError>(Some(secret.data))
        }
        .instrument(connection_span!("fetch", owner.uid()))
        .await
        .context(Context::FetchConnection)
    }

    /// Copy the connection details published by `from` into the publish
    /// target of `to`.
    ///
    /// The source secret must be owned by `from`; otherwise nothing is
    /// written. Returns `Ok(false)` when either side does not publish.
    pub async fn propagate_connection(
        &self,
        to: &dyn ConnectionSecretOwner,
        from: &dyn ConnectionSecretOwner,
    ) -> Result<bool> {
        let (Some(source), Some(destination)) =
            (from.publish_connection_details_to(), to.publish_connection_details_to())
        else {
            return Ok(false);
        };

        async {
            let source_secret = async {
                let store = self.connect_target(source, "source_store_config").await?;
                store.read_key_values(&ScopedName::new(&source.name, from.namespace())).await
            }
            .await
            .context(Context::FetchSource)?;

            if source_secret.owner_uid() != Some(from.uid()) {
                return Err::<bool, _>(ConnectionError::not_owned(
                    from.uid(),
                    source_secret.owner_uid().unwrap_or("none"),
                ));
            }

            async {
                let store = self.connect_target(destination, "destination_store_config").await?;
                let secret = owned_secret(to, destination, source_secret.data);
                let changed =
                    store.write_key_values(&secret, &[&MustBeOwnedBy::new(to.uid())]).await?;
                info!(
                    from = %source_secret.scoped_name,
                    to = %secret.scoped_name,
                    changed,
                    "Propagated connection details"
                );
                Ok::<_, ConnectionError>(changed)
            }
            .await
            .context(Context::WriteDestination)
        }
        .instrument(connection_span!(
            "propagate",
            to.uid(),
            from_uid = %from.uid(),
            source_store_config = field::Empty,
            destination_store_config = field::Empty
        ))
        .await
        .context(Context::PropagateConnection)
    }
}

/// Kubernetes and Vault builders plus the External builder, which loads its
/// client TLS material from the configured directory on every build.
pub fn default_registry(settings: &ManagerSettings) -> StoreRegistry {
    StoreRegistry::with_defaults().with(
        StoreType::External,
        ExternalStore::builder_from_dir(settings.plugin_tls_dir.clone()),
    )
}

/// Secret for an owner's target, stamped with the owner UID and defaulted type.
fn owned_secret(
    owner: &dyn ConnectionSecretOwner,
    target: &PublishConnectionDetailsTo,
    data: KeyValues,
) -> Secret {
    let mut secret = Secret::new(ScopedName::new(&target.name, owner.namespace())).with_data(data);
    secret.metadata = target.metadata.clone();
    let metadata = secret.metadata_mut();
    metadata.owner_uid = Some(owner.uid().to_string());
    if metadata.secret_type.is_none() {
        metadata.secret_type = Some(DEFAULT_SECRET_TYPE.to_string());
    }
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::owner::ResourceOwner;
    use crate::connection::resolver::StaticStoreConfigResolver;
    use crate::store::{key_values, InMemoryStore, SecretMetadata, StoreBuilderFn, StoreConfigSpec};
    use futures::FutureExt;
    use tracing_test::traced_test;

    fn memory_type() -> StoreType {
        StoreType::Other("Memory".into())
    }

    fn manager(memory: &Arc<InMemoryStore>) -> DetailsManager {
        let shared = memory.clone();
        let builder: StoreBuilderFn = Arc::new(move |_ctx| {
            let store: Box<dyn Store> = Box::new(shared.clone());
            async move { Ok(store) }.boxed()
        });
        let spec = StoreConfigSpec { store_type: memory_type(), ..Default::default() };
        let resolver = StaticStoreConfigResolver::new()
            .with("default", spec.clone())
            .with("secondary", spec);
        DetailsManager::new(Arc::new(resolver), StoreRegistry::new().with(memory_type(), builder))
    }

    fn owner(uid: &str, target: &str) -> ResourceOwner {
        ResourceOwner::new(uid, "team-a").publishing_to(PublishConnectionDetailsTo::new(target))
    }

    #[tokio::test]
    async fn test_publish_without_target_is_noop() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let owner = ResourceOwner::new("x", "team-a");

        let changed = manager
            .publish_connection(&owner, &key_values([("password", "s3cr3t")]))
            .await
            .unwrap();
        assert!(!changed);
        assert!(memory.is_empty());
        assert!(manager.fetch_connection(&owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_stamps_owner_and_type() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let owner = ResourceOwner::new("x", "team-a").publishing_to(
            PublishConnectionDetailsTo::new("db").with_metadata(SecretMetadata {
                labels: [("env".to_string(), "prod".to_string())].into(),
                ..Default::default()
            }),
        );

        let details = key_values([("password", "s3cr3t")]);
        assert!(manager.publish_connection(&owner, &details).await.unwrap());
        assert!(!manager.publish_connection(&owner, &details).await.unwrap());

        let stored = memory.get(&ScopedName::new("db", "team-a")).unwrap();
        assert_eq!(stored.owner_uid(), Some("x"));
        assert_eq!(stored.secret_type(), Some(DEFAULT_SECRET_TYPE));
        assert_eq!(stored.metadata.unwrap().labels["env"], "prod");
    }

    #[tokio::test]
    async fn test_publish_rejects_foreign_owner() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let mut existing = Secret::new(ScopedName::new("db", "team-a"))
            .with_data(key_values([("password", "old")]));
        existing.set_owner_uid("y");
        memory.insert(existing);

        let err = manager
            .publish_connection(&owner("x", "db"), &key_values([("password", "new")]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.contexts(), vec![Context::PublishConnection, Context::ApplySecret]);
        assert_eq!(memory.mutations(), 0);
    }

    #[tokio::test]
    async fn test_unpublish_removes_only_named_keys() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let owner = owner("x", "db");

        let details = key_values([("user", "admin"), ("password", "s3cr3t")]);
        manager.publish_connection(&owner, &details).await.unwrap();
        manager.unpublish_connection(&owner, &key_values([("password", "")])).await.unwrap();

        let fetched = manager.fetch_connection(&owner).await.unwrap().unwrap();
        assert_eq!(fetched.keys().collect::<Vec<_>>(), vec!["user"]);

        manager.unpublish_connection(&owner, &KeyValues::new()).await.unwrap();
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_missing_secret_is_not_found() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);

        let err = manager.fetch_connection(&owner("x", "db")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.contexts()[0], Context::FetchConnection);
    }

    #[tokio::test]
    async fn test_propagate_requires_source_ownership() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let source = owner("x", "src");
        let destination = owner("z", "dst");

        let mut foreign = Secret::new(ScopedName::new("src", "team-a"))
            .with_data(key_values([("password", "s3cr3t")]));
        foreign.set_owner_uid("y");
        memory.insert(foreign);

        let err = manager.propagate_connection(&destination, &source).await.unwrap_err();
        assert!(matches!(err.root(), ConnectionError::NotOwned { .. }));
        assert!(memory.get(&ScopedName::new("dst", "team-a")).is_none());
    }

    #[tokio::test]
    async fn test_propagate_copies_details() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let source = owner("x", "src");
        let destination = owner("z", "dst");

        manager.publish_connection(&source, &key_values([("password", "s3cr3t")])).await.unwrap();
        assert!(manager.propagate_connection(&destination, &source).await.unwrap());

        let copied = memory.get(&ScopedName::new("dst", "team-a")).unwrap();
        assert_eq!(copied.owner_uid(), Some("z"));
        assert_eq!(copied.data["password"], b"s3cr3t".to_vec());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_propagate_logs_both_store_configs() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let source = owner("x", "src");
        let destination = ResourceOwner::new("z", "team-a")
            .publishing_to(PublishConnectionDetailsTo::new("dst").with_config("secondary"));

        manager.publish_connection(&source, &key_values([("password", "s3cr3t")])).await.unwrap();
        assert!(manager.propagate_connection(&destination, &source).await.unwrap());

        assert!(logs_contain("source_store_config=default"));
        assert!(logs_contain("destination_store_config=secondary"));
    }

    #[test]
    fn test_default_registry_types() {
        let registry = default_registry(&ManagerSettings::default());
        assert!(registry.has_builder(&StoreType::Kubernetes));
        assert!(registry.has_builder(&StoreType::Vault));
        assert!(registry.has_builder(&StoreType::External));
    }

    #[tokio::test]
    async fn test_unknown_store_config() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager(&memory);
        let owner = ResourceOwner::new("x", "team-a")
            .publishing_to(PublishConnectionDetailsTo::new("db").with_config("missing"));

        let err = manager.publish_connection(&owner, &KeyValues::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.contexts(), vec![Context::PublishConnection, Context::GetStoreConfig]);
    }
}
