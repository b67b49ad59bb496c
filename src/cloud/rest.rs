//! REST-backed control-plane clients.
//!
//! One [`RestTransport`] per client set carries the shared HTTP client, the
//! current region binding and the authorization seam. Individual clients
//! derive their per-service endpoint from the bound region on every call,
//! so rebinding the region redirects subsequent requests atomically from
//! the caller's perspective.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;

use super::types::{
    ApiStatus, InstanceAction, NodeAction, ResourceSummary, SearchPage, StructuredSearchRequest,
};
use super::{
    AnalyticsClient, ClientFactory, ClientSet, CloudError, ComputeClient, DatabaseClient,
    IdentityClient, IntegrationClient, SearchClient,
};

const CORE_API: &str = "20160918";
const DATABASE_API: &str = "20160918";
const IDENTITY_API: &str = "20160918";
const SEARCH_API: &str = "20180409";
const ANALYTICS_API: &str = "20190331";
const INTEGRATION_API: &str = "20190131";

/// Default realm second-level domain.
pub const DEFAULT_DOMAIN: &str = "oraclecloud.com";

/// Stamps outgoing requests with credentials.
///
/// Construction of richer signing providers is host plumbing; the pipeline
/// only requires that something can authorize a request builder.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CloudError>;
}

/// Bearer authorization from a pre-established session token.
pub struct SessionTokenAuthorizer {
    token: String,
}

impl SessionTokenAuthorizer {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl Authorizer for SessionTokenAuthorizer {
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CloudError> {
        Ok(request.bearer_auth(&self.token))
    }
}

/// Shared state behind one region-bindable client set.
pub struct RestTransport {
    http: reqwest::Client,
    authorizer: Arc<dyn Authorizer>,
    region: RwLock<String>,
    domain: String,
}

impl RestTransport {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        authorizer: Arc<dyn Authorizer>,
        region: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authorizer,
            region: RwLock::new(region.into()),
            domain: domain.into(),
        }
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }

    /// `https://{service}.{region}.{domain}` for the bound region.
    fn service_host(&self, service: &str) -> String {
        let region = self.region.read();
        format!("https://{service}.{}.{}", *region, self.domain)
    }

    /// Host form used by the platform services (analytics, integration).
    fn ocp_host(&self, service: &str) -> String {
        let region = self.region.read();
        format!("https://{service}.{}.ocp.{}", *region, self.domain)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CloudError> {
        let request = self.authorizer.authorize(request).await?;
        request
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))
    }

    /// Sends a mutation and reduces the response to its status line.
    async fn send_for_status(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiStatus, CloudError> {
        let response = self.send(request).await?;
        CloudError::check(status_of(&response))
    }
}

fn status_of(response: &reqwest::Response) -> ApiStatus {
    let status = response.status();
    ApiStatus::new(status.as_u16(), status.canonical_reason().unwrap_or_default())
}

/// Resource catalog search over `query.{region}`.
pub struct RestSearchClient {
    transport: Arc<RestTransport>,
}

#[async_trait]
impl SearchClient for RestSearchClient {
    async fn search(&self, request: &StructuredSearchRequest) -> Result<SearchPage, CloudError> {
        let url = format!("{}/{SEARCH_API}/resources", self.transport.service_host("query"));

        let mut builder = self
            .transport
            .http
            .post(url)
            .query(&[("limit", request.limit.to_string())])
            .json(&json!({ "type": "Structured", "query": request.query }));
        if let Some(page) = &request.page {
            builder = builder.query(&[("page", page)]);
        }

        let response = self.transport.send(builder).await?;
        CloudError::check(status_of(&response))?;

        let next_page = response
            .headers()
            .get("opc-next-page")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            items: Vec<ResourceSummary>,
        }
        let body: Body = response
            .json()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Ok(SearchPage { items: body.items, next_page })
    }

    fn set_region(&self, region: &str) {
        self.transport.set_region(region);
    }
}

/// Compute instance actions over `iaas.{region}`.
pub struct RestComputeClient {
    transport: Arc<RestTransport>,
}

#[async_trait]
impl ComputeClient for RestComputeClient {
    async fn instance_action(
        &self,
        instance_id: &str,
        action: InstanceAction,
    ) -> Result<ApiStatus, CloudError> {
        let url = format!(
            "{}/{CORE_API}/instances/{instance_id}",
            self.transport.service_host("iaas")
        );
        let builder = self
            .transport
            .http
            .post(url)
            .query(&[("action", action.as_str())]);
        self.transport.send_for_status(builder).await
    }

    fn set_region(&self, region: &str) {
        self.transport.set_region(region);
    }
}

/// Database node and autonomous database actions over `database.{region}`.
pub struct RestDatabaseClient {
    transport: Arc<RestTransport>,
}

impl RestDatabaseClient {
    async fn autonomous_action(&self, id: &str, verb: &str) -> Result<ApiStatus, CloudError> {
        let url = format!(
            "{}/{DATABASE_API}/autonomousDatabases/{id}/actions/{verb}",
            self.transport.service_host("database")
        );
        self.transport.send_for_status(self.transport.http.post(url)).await
    }
}

#[async_trait]
impl DatabaseClient for RestDatabaseClient {
    async fn db_node_action(
        &self,
        node_id: &str,
        action: NodeAction,
    ) -> Result<ApiStatus, CloudError> {
        let url = format!(
            "{}/{DATABASE_API}/dbNodes/{node_id}",
            self.transport.service_host("database")
        );
        let builder = self
            .transport
            .http
            .post(url)
            .query(&[("action", action.as_str())]);
        self.transport.send_for_status(builder).await
    }

    async fn start_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.autonomous_action(id, "start").await
    }

    async fn stop_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.autonomous_action(id, "stop").await
    }

    fn set_region(&self, region: &str) {
        self.transport.set_region(region);
    }
}

/// Analytics instance activation over `analytics.{region}.ocp`.
pub struct RestAnalyticsClient {
    transport: Arc<RestTransport>,
}

impl RestAnalyticsClient {
    async fn action(&self, id: &str, verb: &str) -> Result<ApiStatus, CloudError> {
        let url = format!(
            "{}/{ANALYTICS_API}/analyticsInstances/{id}/actions/{verb}",
            self.transport.ocp_host("analytics")
        );
        self.transport.send_for_status(self.transport.http.post(url)).await
    }
}

#[async_trait]
impl AnalyticsClient for RestAnalyticsClient {
    async fn start_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.action(id, "start").await
    }

    async fn stop_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.action(id, "stop").await
    }

    fn set_region(&self, region: &str) {
        self.transport.set_region(region);
    }
}

/// Integration instance activation over `integration.{region}.ocp`.
pub struct RestIntegrationClient {
    transport: Arc<RestTransport>,
}

impl RestIntegrationClient {
    async fn action(&self, id: &str, verb: &str) -> Result<ApiStatus, CloudError> {
        let url = format!(
            "{}/{INTEGRATION_API}/integrationInstances/{id}/actions/{verb}",
            self.transport.ocp_host("integration")
        );
        self.transport.send_for_status(self.transport.http.post(url)).await
    }
}

#[async_trait]
impl IntegrationClient for RestIntegrationClient {
    async fn start_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.action(id, "start").await
    }

    async fn stop_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.action(id, "stop").await
    }

    fn set_region(&self, region: &str) {
        self.transport.set_region(region);
    }
}

/// Region subscription listing over `identity.{region}`.
pub struct RestIdentityClient {
    transport: Arc<RestTransport>,
}

#[async_trait]
impl IdentityClient for RestIdentityClient {
    async fn list_subscribed_regions(&self, tenancy_id: &str) -> Result<Vec<String>, CloudError> {
        let url = format!(
            "{}/{IDENTITY_API}/tenancies/{tenancy_id}/regionSubscriptions",
            self.transport.service_host("identity")
        );

        let response = self.transport.send(self.transport.http.get(url)).await?;
        CloudError::check(status_of(&response))?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Subscription {
            region_name: String,
        }
        let subscriptions: Vec<Subscription> = response
            .json()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Ok(subscriptions.into_iter().map(|s| s.region_name).collect())
    }
}

/// Builds REST client sets bound to the credential's home region.
pub struct RestClientFactory {
    http: reqwest::Client,
    authorizer: Arc<dyn Authorizer>,
    home_region: String,
    domain: String,
}

impl RestClientFactory {
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>, home_region: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            authorizer,
            home_region: home_region.into(),
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }

    fn transport(&self) -> Arc<RestTransport> {
        Arc::new(RestTransport::new(
            self.http.clone(),
            Arc::clone(&self.authorizer),
            self.home_region.clone(),
            self.domain.clone(),
        ))
    }
}

impl ClientFactory for RestClientFactory {
    fn client_set(&self) -> ClientSet {
        // One transport per set: the controller rebinds all five clients as
        // a unit, so they share a region cell.
        let transport = self.transport();
        ClientSet {
            search: Arc::new(RestSearchClient { transport: Arc::clone(&transport) }),
            compute: Arc::new(RestComputeClient { transport: Arc::clone(&transport) }),
            database: Arc::new(RestDatabaseClient { transport: Arc::clone(&transport) }),
            analytics: Arc::new(RestAnalyticsClient { transport: Arc::clone(&transport) }),
            integration: Arc::new(RestIntegrationClient { transport }),
        }
    }

    fn identity(&self) -> Arc<dyn IdentityClient> {
        Arc::new(RestIdentityClient { transport: self.transport() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> RestTransport {
        struct NoAuth;
        #[async_trait]
        impl Authorizer for NoAuth {
            async fn authorize(
                &self,
                request: reqwest::RequestBuilder,
            ) -> Result<reqwest::RequestBuilder, CloudError> {
                Ok(request)
            }
        }
        RestTransport::new(
            reqwest::Client::new(),
            Arc::new(NoAuth),
            "us-ashburn-1",
            DEFAULT_DOMAIN,
        )
    }

    #[test]
    fn hosts_follow_the_region_binding() {
        let t = transport();
        assert_eq!(t.service_host("iaas"), "https://iaas.us-ashburn-1.oraclecloud.com");
        assert_eq!(
            t.ocp_host("analytics"),
            "https://analytics.us-ashburn-1.ocp.oraclecloud.com"
        );

        t.set_region("eu-frankfurt-1");
        assert_eq!(t.service_host("query"), "https://query.eu-frankfurt-1.oraclecloud.com");
    }
}
