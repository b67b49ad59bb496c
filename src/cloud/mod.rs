//! Control-plane contracts.
//!
//! Every collaborator the pipeline talks to is an async trait defined here:
//! the catalog search service, the per-kind action clients, and the identity
//! service used for region enumeration. [`rest`] implements them over the
//! provider's REST endpoints; [`fake`] is the in-memory cloud the test suite
//! drives.
//!
//! Clients are region-bindable: a controller rebinds its client set to its
//! region before any call, never concurrently with calls in flight.

pub mod fake;
pub mod rest;
pub mod types;

pub use types::{
    ApiStatus, DefinedTags, InstanceAction, NodeAction, ResourceKind, ResourceSummary,
    SearchPage, StructuredSearchRequest, TagValues,
};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// A failed control-plane exchange.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The service answered with a non-2xx status.
    #[error("control plane returned {status}")]
    Status { status: ApiStatus },

    /// The request never completed (connect, TLS, body decode).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl CloudError {
    /// Promotes a non-2xx status into an error, passing 2xx through.
    pub fn check(status: ApiStatus) -> Result<ApiStatus, CloudError> {
        if status.is_success() {
            Ok(status)
        } else {
            Err(CloudError::Status { status })
        }
    }
}

/// Paginated structured search against the resource catalog.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &StructuredSearchRequest) -> Result<SearchPage, CloudError>;

    fn set_region(&self, region: &str);
}

/// Compute instance lifecycle actions.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn instance_action(
        &self,
        instance_id: &str,
        action: InstanceAction,
    ) -> Result<ApiStatus, CloudError>;

    fn set_region(&self, region: &str);
}

/// Database node and autonomous database lifecycle actions.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn db_node_action(
        &self,
        node_id: &str,
        action: NodeAction,
    ) -> Result<ApiStatus, CloudError>;

    async fn start_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError>;

    async fn stop_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError>;

    fn set_region(&self, region: &str);
}

/// Analytics instance activation.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    async fn start_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError>;

    async fn stop_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError>;

    fn set_region(&self, region: &str);
}

/// Integration instance activation.
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    async fn start_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError>;

    async fn stop_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError>;

    fn set_region(&self, region: &str);
}

/// Tenancy metadata: region subscriptions.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn list_subscribed_regions(&self, tenancy_id: &str) -> Result<Vec<String>, CloudError>;
}

/// The bundle of kind clients one handler owns.
///
/// Cheap to clone; clones share the underlying clients.
#[derive(Clone)]
pub struct ClientSet {
    pub search: Arc<dyn SearchClient>,
    pub compute: Arc<dyn ComputeClient>,
    pub database: Arc<dyn DatabaseClient>,
    pub analytics: Arc<dyn AnalyticsClient>,
    pub integration: Arc<dyn IntegrationClient>,
}

impl ClientSet {
    /// Rebinds every embedded client to `region`.
    pub fn set_region(&self, region: &str) {
        self.search.set_region(region);
        self.compute.set_region(region);
        self.database.set_region(region);
        self.analytics.set_region(region);
        self.integration.set_region(region);
    }
}

impl std::fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSet").finish_non_exhaustive()
    }
}

/// Builds fresh client sets, one per region controller.
///
/// Controllers mutate client region bindings, so parallel regions must not
/// share a set.
pub trait ClientFactory: Send + Sync {
    fn client_set(&self) -> ClientSet;

    fn identity(&self) -> Arc<dyn IdentityClient>;
}
