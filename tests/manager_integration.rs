//! Integration tests for the details manager
//!
//! Drive publish, fetch, propagate and unpublish end to end through the
//! registry, against an in-memory store and a mocked Vault HTTP API.

use std::sync::Arc;

use connstore::config::ManagerSettings;
use connstore::connection::{
    default_registry, DetailsManager, PublishConnectionDetailsTo, ResourceOwner,
    StaticStoreConfigResolver,
};
use connstore::errors::{ConnectionError, Context};
use connstore::store::config::{
    CredentialsSource, FsSelector, KvVersion, VaultAuthConfig, VaultStoreConfig,
};
use connstore::store::{
    key_values, InMemoryStore, KeyValues, ScopedName, Secret, Store, StoreBuilderFn,
    StoreConfigSpec, StoreRegistry, StoreType,
};
use futures::FutureExt;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn memory_type() -> StoreType {
    StoreType::Other("Memory".to_string())
}

/// Manager whose "default" and "secondary" StoreConfigs both resolve to
/// separate in-memory stores.
fn memory_manager() -> (DetailsManager, Arc<InMemoryStore>, Arc<InMemoryStore>) {
    let primary = Arc::new(InMemoryStore::new());
    let secondary = Arc::new(InMemoryStore::new());

    let builder = {
        let primary = primary.clone();
        let secondary = secondary.clone();
        let builder: StoreBuilderFn = Arc::new(move |ctx| {
            let store: Box<dyn Store> = if ctx.spec.default_scope == "secondary" {
                Box::new(secondary.clone())
            } else {
                Box::new(primary.clone())
            };
            async move { Ok(store) }.boxed()
        });
        builder
    };

    let resolver = StaticStoreConfigResolver::new()
        .with("default", StoreConfigSpec { store_type: memory_type(), ..Default::default() })
        .with(
            "secondary",
            StoreConfigSpec {
                store_type: memory_type(),
                default_scope: "secondary".to_string(),
                ..Default::default()
            },
        );

    let manager =
        DetailsManager::new(Arc::new(resolver), StoreRegistry::new().with(memory_type(), builder));
    (manager, primary, secondary)
}

fn owner(uid: &str, target: PublishConnectionDetailsTo) -> ResourceOwner {
    ResourceOwner::new(uid, "team-a").publishing_to(target)
}

#[tokio::test]
async fn test_connection_lifecycle() {
    let (manager, store, _) = memory_manager();
    let db = owner("uid-db", PublishConnectionDetailsTo::new("db-conn"));

    let details = key_values([("endpoint", "db.internal"), ("password", "s3cr3t")]);
    assert!(manager.publish_connection(&db, &details).await.unwrap());
    assert!(!manager.publish_connection(&db, &details).await.unwrap());
    assert_eq!(store.mutations(), 1);

    let fetched = manager.fetch_connection(&db).await.unwrap().unwrap();
    assert_eq!(fetched, details);

    manager.unpublish_connection(&db, &KeyValues::new()).await.unwrap();
    assert!(store.is_empty());

    let err = manager.fetch_connection(&db).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_foreign_secret_is_never_overwritten_or_deleted() {
    let (manager, store, _) = memory_manager();
    let mut foreign = Secret::new(ScopedName::new("db-conn", "team-a"))
        .with_data(key_values([("password", "theirs")]));
    foreign.set_owner_uid("uid-other");
    store.insert(foreign.clone());

    let db = owner("uid-db", PublishConnectionDetailsTo::new("db-conn"));
    let err = manager
        .publish_connection(&db, &key_values([("password", "ours")]))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let err = manager.unpublish_connection(&db, &KeyValues::new()).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.contexts()[0], Context::UnpublishConnection);

    assert_eq!(store.get(&foreign.scoped_name), Some(foreign));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_propagate_across_store_configs() {
    let (manager, primary, secondary) = memory_manager();
    let source = owner("uid-src", PublishConnectionDetailsTo::new("db-conn"));
    let destination =
        owner("uid-dst", PublishConnectionDetailsTo::new("app-conn").with_config("secondary"));

    manager.publish_connection(&source, &key_values([("password", "s3cr3t")])).await.unwrap();
    assert!(manager.propagate_connection(&destination, &source).await.unwrap());
    assert!(!manager.propagate_connection(&destination, &source).await.unwrap());

    assert_eq!(primary.len(), 1);
    let copied = secondary.get(&ScopedName::new("app-conn", "team-a")).unwrap();
    assert_eq!(copied.owner_uid(), Some("uid-dst"));
    assert_eq!(copied.data["password"], b"s3cr3t".to_vec());
}

#[tokio::test]
async fn test_propagate_from_unowned_source_fails_without_write() {
    let (manager, primary, secondary) = memory_manager();
    primary.insert(
        Secret::new(ScopedName::new("db-conn", "team-a"))
            .with_data(key_values([("password", "s3cr3t")])),
    );

    let source = owner("uid-src", PublishConnectionDetailsTo::new("db-conn"));
    let destination =
        owner("uid-dst", PublishConnectionDetailsTo::new("app-conn").with_config("secondary"));

    let err = manager.propagate_connection(&destination, &source).await.unwrap_err();
    assert!(matches!(err.root(), ConnectionError::NotOwned { .. }));
    assert_eq!(err.contexts(), vec![Context::PropagateConnection]);
    assert!(secondary.is_empty());
}

#[tokio::test]
async fn test_propagate_missing_source() {
    let (manager, _, secondary) = memory_manager();
    let source = owner("uid-src", PublishConnectionDetailsTo::new("db-conn"));
    let destination = owner("uid-dst", PublishConnectionDetailsTo::new("app-conn"));

    let err = manager.propagate_connection(&destination, &source).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.contexts()[..2], [Context::PropagateConnection, Context::FetchSource]);
    assert!(secondary.is_empty());
}

#[tokio::test]
async fn test_owners_without_targets_are_skipped() {
    let (manager, store, _) = memory_manager();
    let silent = ResourceOwner::new("uid-silent", "team-a");
    let db = owner("uid-db", PublishConnectionDetailsTo::new("db-conn"));

    assert!(!manager.publish_connection(&silent, &key_values([("a", "1")])).await.unwrap());
    manager.unpublish_connection(&silent, &KeyValues::new()).await.unwrap();
    assert!(manager.fetch_connection(&silent).await.unwrap().is_none());
    assert!(!manager.propagate_connection(&db, &silent).await.unwrap());
    assert!(!manager.propagate_connection(&silent, &db).await.unwrap());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_publish_to_vault_kv_v1() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/team-a/db-conn"))
        .and(header("X-Vault-Token", "root-token"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/team-a/db-conn"))
        .and(body_json(json!({"password": "s3cr3t"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token");
    std::fs::write(&token_path, "root-token\n").unwrap();

    let spec = StoreConfigSpec {
        store_type: StoreType::Vault,
        vault: Some(VaultStoreConfig {
            server: server.uri(),
            mount_path: "secret/".to_string(),
            version: KvVersion::V1,
            namespace: None,
            ca_bundle: None,
            auth: VaultAuthConfig {
                token: CredentialsSource::Filesystem {
                    fs: FsSelector { path: token_path.display().to_string() },
                },
                ..Default::default()
            },
            timeout_seconds: Some(5),
        }),
        ..Default::default()
    };

    let settings = ManagerSettings::default();
    let manager = DetailsManager::new(
        Arc::new(StaticStoreConfigResolver::new().with("vault", spec)),
        default_registry(&settings),
    );

    let db = owner("uid-db", PublishConnectionDetailsTo::new("db-conn").with_config("vault"));
    assert!(manager.publish_connection(&db, &key_values([("password", "s3cr3t")])).await.unwrap());
}

#[tokio::test]
async fn test_plugin_store_without_tls_material_fails_to_build() {
    let dir = tempfile::tempdir().unwrap();
    let settings =
        ManagerSettings { plugin_tls_dir: dir.path().join("missing"), ..Default::default() };

    let spec: StoreConfigSpec = serde_json::from_value(json!({
        "type": "Plugin",
        "plugin": {
            "endpoint": "https://plugin:4000",
            "configRef": {
                "apiVersion": "secrets.connstore.io/v1alpha1",
                "kind": "VaultConfig",
                "name": "vault"
            }
        }
    }))
    .unwrap();

    let manager = DetailsManager::new(
        Arc::new(StaticStoreConfigResolver::new().with("default", spec)),
        default_registry(&settings),
    );

    let db = owner("uid-db", PublishConnectionDetailsTo::new("db-conn"));
    let err = manager.publish_connection(&db, &key_values([("a", "1")])).await.unwrap_err();
    assert_eq!(
        err.contexts(),
        vec![Context::PublishConnection, Context::BuildStore, Context::LoadTls]
    );
}
