//! RPC surface of an external secret store plugin.

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::Status;

use crate::proto::v1alpha1::external_secret_store_service_client::ExternalSecretStoreServiceClient;
use crate::proto::v1alpha1::{
    ApplySecretRequest, ApplySecretResponse, DeleteKeysRequest, DeleteKeysResponse,
    GetSecretRequest, GetSecretResponse,
};

/// The three plugin RPCs.
#[async_trait]
pub trait PluginClient: Send + Sync {
    async fn get_secret(&self, request: GetSecretRequest) -> Result<GetSecretResponse, Status>;

    async fn apply_secret(&self, request: ApplySecretRequest)
        -> Result<ApplySecretResponse, Status>;

    async fn delete_keys(&self, request: DeleteKeysRequest) -> Result<DeleteKeysResponse, Status>;
}

/// Generated tonic client. Clones share the underlying channel.
#[async_trait]
impl PluginClient for ExternalSecretStoreServiceClient<Channel> {
    async fn get_secret(&self, request: GetSecretRequest) -> Result<GetSecretResponse, Status> {
        let mut client = self.clone();
        ExternalSecretStoreServiceClient::get_secret(&mut client, request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn apply_secret(
        &self,
        request: ApplySecretRequest,
    ) -> Result<ApplySecretResponse, Status> {
        let mut client = self.clone();
        ExternalSecretStoreServiceClient::apply_secret(&mut client, request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn delete_keys(&self, request: DeleteKeysRequest) -> Result<DeleteKeysResponse, Status> {
        let mut client = self.clone();
        ExternalSecretStoreServiceClient::delete_keys(&mut client, request)
            .await
            .map(tonic::Response::into_inner)
    }
}
