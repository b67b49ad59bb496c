//! In-memory cloud used by the test suite.
//!
//! One [`FakeCloud`] models the whole tenancy: resources per region, child
//! nodes per database system, and a log of every control-plane mutation.
//! Client sets built from it share the tenancy state but carry their own
//! region binding, mirroring how the REST clients behave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::types::{
    ApiStatus, InstanceAction, NodeAction, ResourceKind, ResourceSummary, SearchPage,
    StructuredSearchRequest, TagValues,
};
use super::{
    AnalyticsClient, ClientFactory, ClientSet, CloudError, ComputeClient, DatabaseClient,
    IdentityClient, IntegrationClient, SearchClient,
};

/// A recorded control-plane mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub region: String,
    pub service: &'static str,
    pub id: String,
    pub action: String,
}

#[derive(Default)]
struct FakeState {
    resources: HashMap<String, Vec<ResourceSummary>>,
    db_nodes: HashMap<String, Vec<ResourceSummary>>,
    subscribed_regions: Vec<String>,
    calls: Vec<CallRecord>,
    page_size: Option<usize>,
    action_delay: Duration,
    search_delay: Duration,
    search_failure: Option<String>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Shared fake tenancy.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&self, region: &str, resource: ResourceSummary) {
        let mut state = self.state.lock();
        state.resources.entry(region.to_string()).or_default().push(resource);
        let region = region.to_string();
        if !state.subscribed_regions.contains(&region) {
            state.subscribed_regions.push(region);
        }
    }

    /// Registers a child node returned by the nested `dbSystemId` search.
    pub fn add_db_node(&self, db_system_id: &str, node: ResourceSummary) {
        self.state
            .lock()
            .db_nodes
            .entry(db_system_id.to_string())
            .or_default()
            .push(node);
    }

    pub fn set_subscribed_regions(&self, regions: &[&str]) {
        self.state.lock().subscribed_regions =
            regions.iter().map(|r| r.to_string()).collect();
    }

    /// Limits search pages to `size` items so pagination paths run.
    pub fn set_page_size(&self, size: usize) {
        self.state.lock().page_size = Some(size);
    }

    /// Makes every action call hold its permit for `delay`.
    pub fn set_action_delay(&self, delay: Duration) {
        self.state.lock().action_delay = delay;
    }

    /// Makes every search page take `delay` to return.
    pub fn set_search_delay(&self, delay: Duration) {
        self.state.lock().search_delay = delay;
    }

    /// Fails every subsequent catalog search with a transport error.
    pub fn fail_search_with(&self, message: &str) {
        self.state.lock().search_failure = Some(message.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn calls_for(&self, id: &str) -> Vec<CallRecord> {
        self.state.lock().calls.iter().filter(|c| c.id == id).cloned().collect()
    }

    /// Highest number of simultaneously in-flight action calls seen in
    /// `region`.
    #[must_use]
    pub fn max_in_flight(&self, region: &str) -> usize {
        self.state.lock().max_in_flight.get(region).copied().unwrap_or(0)
    }

    async fn record_action(&self, region: &str, service: &'static str, id: &str, action: &str) {
        let delay = {
            let mut state = self.state.lock();
            let gauge = state.in_flight.entry(region.to_string()).or_default();
            *gauge += 1;
            let current = *gauge;
            let peak = state.max_in_flight.entry(region.to_string()).or_default();
            *peak = (*peak).max(current);
            state.action_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        *state.in_flight.entry(region.to_string()).or_default() -= 1;
        state.calls.push(CallRecord {
            region: region.to_string(),
            service,
            id: id.to_string(),
            action: action.to_string(),
        });
    }
}

impl ClientFactory for FakeCloud {
    fn client_set(&self) -> ClientSet {
        let client = FakeClient {
            cloud: self.clone(),
            region: Arc::new(RwLock::new(String::new())),
        };
        ClientSet {
            search: Arc::new(client.clone()),
            compute: Arc::new(client.clone()),
            database: Arc::new(client.clone()),
            analytics: Arc::new(client.clone()),
            integration: Arc::new(client),
        }
    }

    fn identity(&self) -> Arc<dyn IdentityClient> {
        Arc::new(FakeClient {
            cloud: self.clone(),
            region: Arc::new(RwLock::new(String::new())),
        })
    }
}

/// One region-bindable handle onto the shared tenancy.
#[derive(Clone)]
struct FakeClient {
    cloud: FakeCloud,
    region: Arc<RwLock<String>>,
}

impl FakeClient {
    fn region(&self) -> String {
        self.region.read().clone()
    }
}

#[async_trait]
impl SearchClient for FakeClient {
    async fn search(&self, request: &StructuredSearchRequest) -> Result<SearchPage, CloudError> {
        let (delay, result) = {
            let state = self.cloud.state.lock();
            (state.search_delay, self.page_for(&state, request))
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }
}

impl FakeClient {
    fn page_for(
        &self,
        state: &FakeState,
        request: &StructuredSearchRequest,
    ) -> Result<SearchPage, CloudError> {
        if let Some(message) = &state.search_failure {
            return Err(CloudError::Transport(message.clone()));
        }

        // The nested node expansion queries by parent id.
        if let Some(parent) = extract_db_system_id(&request.query) {
            let items = state.db_nodes.get(parent).cloned().unwrap_or_default();
            return Ok(SearchPage { items, next_page: None });
        }

        let all = state.resources.get(&self.region()).cloned().unwrap_or_default();
        let start: usize = request
            .page
            .as_deref()
            .map(|p| p.parse().unwrap_or(0))
            .unwrap_or(0);
        let size = state.page_size.unwrap_or(request.limit as usize).max(1);
        let end = (start + size).min(all.len());

        let next_page = (end < all.len()).then(|| end.to_string());
        Ok(SearchPage { items: all[start..end].to_vec(), next_page })
    }
}

#[async_trait]
impl ComputeClient for FakeClient {
    async fn instance_action(
        &self,
        instance_id: &str,
        action: InstanceAction,
    ) -> Result<ApiStatus, CloudError> {
        self.cloud
            .record_action(&self.region(), "compute", instance_id, action.as_str())
            .await;
        Ok(ApiStatus::new(200, "OK"))
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }
}

#[async_trait]
impl DatabaseClient for FakeClient {
    async fn db_node_action(
        &self,
        node_id: &str,
        action: NodeAction,
    ) -> Result<ApiStatus, CloudError> {
        self.cloud
            .record_action(&self.region(), "database", node_id, action.as_str())
            .await;
        Ok(ApiStatus::new(200, "OK"))
    }

    async fn start_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "database", id, "START").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    async fn stop_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "database", id, "STOP").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }
}

#[async_trait]
impl AnalyticsClient for FakeClient {
    async fn start_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "analytics", id, "START").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    async fn stop_analytics_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "analytics", id, "STOP").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }
}

#[async_trait]
impl IntegrationClient for FakeClient {
    async fn start_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "integration", id, "START").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    async fn stop_integration_instance(&self, id: &str) -> Result<ApiStatus, CloudError> {
        self.cloud.record_action(&self.region(), "integration", id, "STOP").await;
        Ok(ApiStatus::new(202, "Accepted"))
    }

    fn set_region(&self, region: &str) {
        *self.region.write() = region.to_string();
    }
}

#[async_trait]
impl IdentityClient for FakeClient {
    async fn list_subscribed_regions(&self, _tenancy_id: &str) -> Result<Vec<String>, CloudError> {
        Ok(self.cloud.state.lock().subscribed_regions.clone())
    }
}

fn extract_db_system_id(query: &str) -> Option<&str> {
    let (_, rest) = query.split_once("dbSystemId = '")?;
    let (id, _) = rest.split_once('\'')?;
    Some(id)
}

/// Builds a resource summary carrying schedule tags under `namespace`.
#[must_use]
pub fn summary(
    id: &str,
    kind: ResourceKind,
    lifecycle_state: &str,
    namespace: &str,
    tags: &[(&str, &str)],
) -> ResourceSummary {
    let mut defined_tags = HashMap::new();
    if !tags.is_empty() {
        let values: TagValues = tags
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        defined_tags.insert(namespace.to_string(), values);
    }

    ResourceSummary {
        identifier: id.to_string(),
        resource_type: kind,
        display_name: Some(format!("{id}-name")),
        lifecycle_state: lifecycle_state.to_string(),
        compartment_id: None,
        defined_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_paginates_with_cursors() {
        let cloud = FakeCloud::new();
        for i in 0..5 {
            cloud.add_resource(
                "us-ashburn-1",
                summary(&format!("ocid{i}"), ResourceKind::Instance, "RUNNING", "Schedule", &[]),
            );
        }
        cloud.set_page_size(2);

        let set = cloud.client_set();
        set.set_region("us-ashburn-1");

        let mut request = StructuredSearchRequest::new("query instance resources", 1000);
        let mut seen = 0;
        loop {
            let page = set.search.search(&request).await.unwrap();
            seen += page.items.len();
            match page.next_page {
                Some(cursor) => request.page = Some(cursor),
                None => break,
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn nested_query_returns_db_nodes() {
        let cloud = FakeCloud::new();
        cloud.add_db_node(
            "ocid1.dbsystem.oc1..sys",
            summary("ocid1.dbnode.oc1..n1", ResourceKind::DbNode, "STOPPED", "Schedule", &[]),
        );

        let set = cloud.client_set();
        set.set_region("us-ashburn-1");

        let request = StructuredSearchRequest::new(
            "query dbnode resources return alladditionalfields \
             where dbSystemId = 'ocid1.dbsystem.oc1..sys'",
            1000,
        );
        let page = set.search.search(&request).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].resource_type, ResourceKind::DbNode);
    }

    #[tokio::test]
    async fn calls_are_recorded_per_region() {
        let cloud = FakeCloud::new();
        let set = cloud.client_set();
        set.set_region("eu-frankfurt-1");

        set.compute.instance_action("ocid-a", InstanceAction::Stop).await.unwrap();

        let calls = cloud.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].region, "eu-frankfurt-1");
        assert_eq!(calls[0].action, "STOP");
    }
}
