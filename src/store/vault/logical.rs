//! Raw Vault logical API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::errors::{ConnectionError, Context, Result, ResultExt};
use crate::store::types::SecretString;

/// Untyped read/write/delete against raw Vault paths (without the `v1/` prefix).
#[async_trait]
pub trait LogicalClient: Send + Sync {
    /// The response's `data` block, or `None` if the path was never written.
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    async fn write(&self, path: &str, body: Value) -> Result<()>;

    /// Delete a path; an absent path is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// [`LogicalClient`] speaking Vault's HTTP API.
#[derive(Clone)]
pub struct HttpLogicalClient {
    http: reqwest::Client,
    address: String,
    token: SecretString,
    namespace: Option<String>,
}

impl std::fmt::Debug for HttpLogicalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLogicalClient")
            .field("address", &self.address)
            .field("token", &self.token)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl HttpLogicalClient {
    pub fn new(
        address: &str,
        token: SecretString,
        namespace: Option<String>,
        ca_bundle: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(pem) = ca_bundle {
            let certificate = reqwest::Certificate::from_pem(pem).context(Context::BuildClient)?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(Context::BuildClient)?;

        Ok(Self {
            http,
            address: address.trim_end_matches('/').to_string(),
            token,
            namespace: namespace.filter(|ns| !ns.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.address, path.trim_start_matches('/'));
        let mut request = self
            .http
            .request(method, url)
            .header("X-Vault-Token", self.token.expose_secret())
            .header("X-Vault-Request", "true");
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        request
    }
}

#[async_trait]
impl LogicalClient for HttpLogicalClient {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        debug!(path = %path, "Vault read");
        let response = self.request(Method::GET, path).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            // KV v2 answers 404 for deleted or destroyed versions but still
            // returns their metadata, which carries the version for CAS.
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Ok(body
                .get("data")
                .filter(|data| data.as_object().is_some_and(|m| !m.is_empty()))
                .cloned());
        }
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body: Value = response.json().await?;
        Ok(body.get("data").filter(|data| !data.is_null()).cloned())
    }

    async fn write(&self, path: &str, body: Value) -> Result<()> {
        debug!(path = %path, "Vault write");
        let response = self.request(Method::POST, path).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, response).await)
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!(path = %path, "Vault delete");
        let response = self.request(Method::DELETE, path).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(status, response).await)
        }
    }
}

async fn status_error(status: StatusCode, response: Response) -> ConnectionError {
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| errors.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; "))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ConnectionError::authentication_failed(message)
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ConnectionError::unavailable(message)
        }
        s => ConnectionError::backend(s.as_u16(), message),
    }
}
