//! # Connection Details
//!
//! Owner resources, StoreConfig resolution and the [`DetailsManager`] that
//! ties them to the stores.

pub mod manager;
pub mod owner;
pub mod resolver;

pub use manager::{default_registry, DetailsManager, DEFAULT_STORE_CONFIG};
pub use owner::{
    ConnectionSecretOwner, PublishConnectionDetailsTo, ResourceOwner, StoreConfigReference,
};
pub use resolver::{KubeStoreConfigResolver, StaticStoreConfigResolver, StoreConfigResolver};
