use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::errors::{RemoteError, Result, SyncError};
use crate::types::Authentication;

/// Header carrying the Mimir tenant ID
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Operations the sync orchestrator needs from the remote Alertmanager
///
/// `verify` and `apply` read the document from a staged path rather than from
/// memory.
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// Validate a staged document without persisting it
    async fn verify(
        &self,
        auth: &Authentication,
        staged_path: &Path,
    ) -> std::result::Result<(), RemoteError>;

    /// Replace the tenant's active configuration with the staged document
    async fn apply(
        &self,
        auth: &Authentication,
        staged_path: &Path,
        tenant: &str,
        endpoint: &Url,
    ) -> std::result::Result<(), RemoteError>;

    /// Remove the tenant's configuration entirely
    async fn delete(
        &self,
        auth: &Authentication,
        tenant: &str,
        endpoint: &Url,
    ) -> std::result::Result<(), RemoteError>;
}

/// Request body of Mimir's `/api/v1/alerts` endpoint
#[derive(Debug, Serialize)]
struct AlertmanagerPayload<'a> {
    template_files: BTreeMap<String, String>,
    alertmanager_config: &'a str,
}

/// [`SyncClient`] talking to Mimir's Alertmanager configuration API
///
/// # Example
///
/// ```rust,no_run
/// use mimir_alertmanager_sync::{Authentication, MimirClient, SyncClient};
/// use std::path::Path;
/// use std::time::Duration;
/// use url::Url;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = MimirClient::new(Duration::from_secs(10))?;
///     let auth = Authentication::basic("tenant-admin", "api-key");
///     let staged = Path::new("/tmp/mimir-operator/t1/amc_t1");
///
///     client.verify(&auth, staged).await?;
///     client
///         .apply(&auth, staged, "t1", &Url::parse("http://mimir:8080")?)
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MimirClient {
    client: ClientWithMiddleware,
}

impl MimirClient {
    /// Create a new Mimir client
    ///
    /// # Arguments
    ///
    /// * `timeout` - Request timeout duration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SyncError::BuildHttpClient)?;

        let client = ClientBuilder::new(client).build();

        Ok(Self { client })
    }

    /// Create a new client with a custom reqwest middleware client
    ///
    /// This allows you to add custom middleware (retry, logging, etc.)
    pub fn with_client(client: ClientWithMiddleware) -> Self {
        Self { client }
    }

    async fn send(request: RequestBuilder) -> std::result::Result<(), RemoteError> {
        let response = request.send().await.map_err(RemoteError::Request)?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SyncClient for MimirClient {
    /// Check the staged document locally
    ///
    /// This is a shape check only: the document must be valid YAML holding a
    /// non-empty mapping. Alertmanager schema rules (required `route` and
    /// `receivers`, receiver references) are not enforced here and surface as
    /// an apply error from Mimir instead. Nothing is sent to Mimir.
    #[instrument(name = "MimirClient::verify", skip_all, fields(path = %staged_path.display()))]
    async fn verify(
        &self,
        _auth: &Authentication,
        staged_path: &Path,
    ) -> std::result::Result<(), RemoteError> {
        let document = read_document(staged_path).await?;

        let parsed: serde_yaml::Value = serde_yaml::from_str(&document)
            .map_err(|e| RemoteError::Rejected(format!("invalid YAML: {e}")))?;

        match parsed {
            serde_yaml::Value::Mapping(mapping) if !mapping.is_empty() => {
                debug!(keys = mapping.len(), "Configuration is valid");
                Ok(())
            }
            serde_yaml::Value::Mapping(_) => {
                Err(RemoteError::Rejected("configuration is empty".to_string()))
            }
            _ => Err(RemoteError::Rejected(
                "configuration must be a mapping".to_string(),
            )),
        }
    }

    #[instrument(name = "MimirClient::apply", skip_all, fields(tenant = tenant))]
    async fn apply(
        &self,
        auth: &Authentication,
        staged_path: &Path,
        tenant: &str,
        endpoint: &Url,
    ) -> std::result::Result<(), RemoteError> {
        let document = read_document(staged_path).await?;
        let body = serde_yaml::to_string(&AlertmanagerPayload {
            template_files: BTreeMap::new(),
            alertmanager_config: &document,
        })
        .map_err(RemoteError::Encode)?;

        let url = alerts_url(endpoint)?;
        debug!(url = %url, "Loading alertmanager configuration into Mimir");

        let request = self
            .client
            .post(url)
            .header(TENANT_HEADER, tenant)
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(body);
        Self::send(authorize(request, auth)).await?;

        debug!("Alertmanager configuration loaded");
        Ok(())
    }

    #[instrument(name = "MimirClient::delete", skip_all, fields(tenant = tenant))]
    async fn delete(
        &self,
        auth: &Authentication,
        tenant: &str,
        endpoint: &Url,
    ) -> std::result::Result<(), RemoteError> {
        let url = alerts_url(endpoint)?;
        debug!(url = %url, "Deleting alertmanager configuration from Mimir");

        let request = self.client.delete(url).header(TENANT_HEADER, tenant);
        match Self::send(authorize(request, auth)).await {
            Err(RemoteError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!("No alertmanager configuration to delete");
                Ok(())
            }
            result => result,
        }
    }
}

async fn read_document(path: &Path) -> std::result::Result<String, RemoteError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RemoteError::ReadDocument {
            path: path.to_path_buf(),
            source,
        })
}

/// `<endpoint>/api/v1/alerts`, keeping any path prefix of the endpoint
fn alerts_url(endpoint: &Url) -> std::result::Result<Url, RemoteError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| RemoteError::InvalidEndpoint(endpoint.to_string()))?
        .pop_if_empty()
        .extend(["api", "v1", "alerts"]);
    Ok(url)
}

fn authorize(request: RequestBuilder, auth: &Authentication) -> RequestBuilder {
    match auth {
        Authentication::None => request,
        Authentication::Basic { user, key } => request.basic_auth(user, Some(key)),
        Authentication::Bearer { token } => request.bearer_auth(token),
    }
}
