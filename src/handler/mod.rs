//! Kind-dispatched lifecycle-action executor.
//!
//! A [`ResourceHandler`] owns one region's client set and turns evaluated
//! tasks into idempotent control-plane calls: acquire a request token,
//! dispatch on the resource kind, guard against illegal state transitions,
//! and run every call under a scoped timeout. Database systems expand into
//! their child nodes through a nested catalog search; node failures are
//! isolated and joined into one aggregate error for the parent.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::cloud::{
    ClientSet, CloudError, InstanceAction, NodeAction, ResourceKind, ResourceSummary,
};
use crate::pool::{AcquireTimeout, TokenPool};
use crate::search::{Search, SearchError};

/// Timeout applied to each control-plane call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest a task waits for a request token.
pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Control-plane calls admitted per refill interval.
pub const DEFAULT_MAX_REQUESTS: usize = 8;

/// Token pool refill cadence.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(3);

// States in which a power-off (resp. power-on) must not be issued.
const STOP_GUARD: &[&str] = &["STOPPED", "STOPPING", "TERMINATING", "TERMINATED"];
const START_GUARD: &[&str] = &["RUNNING", "STARTING", "TERMINATING", "TERMINATED"];

// Autonomous databases report AVAILABLE rather than RUNNING.
const ADB_START_GUARD: &[&str] = &["AVAILABLE", "STARTING", "TERMINATING", "TERMINATED"];

// The platform services speak ACTIVE/INACTIVE.
const PLATFORM_STOP_GUARD: &[&str] = &["INACTIVE", "DELETING", "DELETED"];
const PLATFORM_START_GUARD: &[&str] = &["ACTIVE", "STARTING", "DELETING", "DELETED"];

/// An evaluated decision bound to the resource it applies to.
///
/// Created by a worker at decision time and dropped when handling returns.
#[derive(Debug, Clone)]
pub struct Task {
    pub action: Action,
    pub resource: ResourceSummary,
}

/// A failed handling attempt. Always scoped to a single resource.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No request token arrived before the acquisition deadline.
    #[error("rate limited: {0}")]
    RateLimited(#[from] AcquireTimeout),

    /// A control-plane call outlasted its scoped timeout.
    #[error("control plane call timed out after {after:?}")]
    CallTimeout { after: Duration },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// The nested node expansion failed.
    #[error("db node search failed: {0}")]
    NodeSearch(#[from] SearchError),

    /// One or more child node actions failed; siblings were still attempted.
    #[error("db system {system}: {} of {total} node actions failed: [{}]", .reasons.len(), .reasons.join("; "))]
    NodeActions {
        system: String,
        total: usize,
        reasons: Vec<String>,
    },
}

/// Tunables for [`ResourceHandler::new`].
pub struct HandlerOpts {
    pub clients: ClientSet,
    pub max_requests: usize,
    pub refill_interval: Duration,
    pub call_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl HandlerOpts {
    #[must_use]
    pub fn new(clients: ClientSet) -> Self {
        Self {
            clients,
            max_requests: DEFAULT_MAX_REQUESTS,
            refill_interval: DEFAULT_REFILL_INTERVAL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            acquire_timeout: MAX_ACQUIRE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    #[must_use]
    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Executes lifecycle actions for every supported resource kind.
pub struct ResourceHandler {
    clients: ClientSet,
    node_search: Search,
    pool: TokenPool,
    call_timeout: Duration,
    acquire_timeout: Duration,
}

impl ResourceHandler {
    /// Builds a handler and its token pool.
    ///
    /// Must be called within a tokio runtime (the pool spawns its refill
    /// task on construction).
    #[must_use]
    pub fn new(opts: HandlerOpts) -> Self {
        let node_search = Search::new(opts.clients.search.clone());
        Self {
            node_search,
            pool: TokenPool::new(opts.max_requests, opts.refill_interval),
            call_timeout: opts.call_timeout,
            acquire_timeout: opts.acquire_timeout,
            clients: opts.clients,
        }
    }

    /// Rebinds every embedded client to `region`.
    ///
    /// Call before the first [`Self::handle`], never concurrently with one.
    pub fn set_region(&self, region: &str) {
        self.clients.set_region(region);
    }

    /// Applies the task's decision to its resource.
    ///
    /// Acquires one request token first; a pool timeout surfaces as
    /// [`HandlerError::RateLimited`] and the resource is skipped. State
    /// guards make re-dispatch of an already-satisfied decision a no-op.
    pub async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        let resource = &task.resource;
        debug!(
            resource = %resource.identifier,
            kind = %resource.resource_type,
            state = %resource.lifecycle_state,
            action = %task.action,
            "handling resource"
        );

        self.pool.acquire(self.acquire_timeout).await?;

        match resource.resource_type {
            ResourceKind::Instance => self.handle_instance(task).await,
            ResourceKind::DbSystem => self.handle_db_system(task).await,
            ResourceKind::AutonomousDatabase => self.handle_autonomous(task).await,
            ResourceKind::AnalyticsInstance => self.handle_analytics(task).await,
            ResourceKind::IntegrationInstance => self.handle_integration(task).await,
            ResourceKind::DbNode => self.node_action(task.action, resource).await,
            ResourceKind::Other(ref kind) => {
                warn!(resource = %resource.identifier, kind, "unsupported resource kind");
                Ok(())
            }
        }
    }

    async fn handle_instance(&self, task: &Task) -> Result<(), HandlerError> {
        let resource = &task.resource;
        let Some(verb) = decide(task.action, &resource.lifecycle_state, STOP_GUARD, START_GUARD)
        else {
            return Ok(no_op(resource, task.action));
        };

        let action = match verb {
            Verb::Start => InstanceAction::Start,
            Verb::Stop => InstanceAction::Stop,
        };
        let status = self
            .timed(self.clients.compute.instance_action(&resource.identifier, action))
            .await?;
        info!(
            resource = %resource.identifier,
            kind = %resource.resource_type,
            action = action.as_str(),
            status = %status,
            "instance action issued"
        );
        Ok(())
    }

    /// Expands the system into its nodes and acts on each, isolating
    /// per-node failures.
    async fn handle_db_system(&self, task: &Task) -> Result<(), HandlerError> {
        let system = &task.resource.identifier;
        let query = format!(
            "query dbnode resources return alladditionalfields where dbSystemId = '{system}'"
        );
        let nodes = self.node_search.search(&query).await?;
        debug!(system = %system, nodes = nodes.len(), "expanded db system");

        let total = nodes.len();
        let mut reasons = Vec::new();
        for node in &nodes {
            if let Err(e) = self.node_action(task.action, node).await {
                error!(
                    node = %node.identifier,
                    system = %system,
                    error = %e,
                    "db node action failed"
                );
                reasons.push(format!("{}: {e}", node.identifier));
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::NodeActions { system: system.clone(), total, reasons })
        }
    }

    async fn node_action(
        &self,
        action: Action,
        node: &ResourceSummary,
    ) -> Result<(), HandlerError> {
        let Some(verb) = decide(action, &node.lifecycle_state, STOP_GUARD, START_GUARD) else {
            return Ok(no_op(node, action));
        };

        let node_verb = match verb {
            Verb::Start => NodeAction::Start,
            Verb::Stop => NodeAction::Stop,
        };
        let status = self
            .timed(self.clients.database.db_node_action(&node.identifier, node_verb))
            .await?;
        info!(
            resource = %node.identifier,
            kind = %node.resource_type,
            action = node_verb.as_str(),
            status = %status,
            "db node action issued"
        );
        Ok(())
    }

    async fn handle_autonomous(&self, task: &Task) -> Result<(), HandlerError> {
        let resource = &task.resource;
        let Some(verb) = decide(task.action, &resource.lifecycle_state, STOP_GUARD, ADB_START_GUARD)
        else {
            return Ok(no_op(resource, task.action));
        };

        let database = &self.clients.database;
        let status = match verb {
            Verb::Start => {
                self.timed(database.start_autonomous_database(&resource.identifier)).await?
            }
            Verb::Stop => {
                self.timed(database.stop_autonomous_database(&resource.identifier)).await?
            }
        };
        info!(
            resource = %resource.identifier,
            kind = %resource.resource_type,
            action = verb.as_str(),
            status = %status,
            "autonomous database action issued"
        );
        Ok(())
    }

    async fn handle_analytics(&self, task: &Task) -> Result<(), HandlerError> {
        let resource = &task.resource;
        let Some(verb) = decide(
            task.action,
            &resource.lifecycle_state,
            PLATFORM_STOP_GUARD,
            PLATFORM_START_GUARD,
        ) else {
            return Ok(no_op(resource, task.action));
        };

        let analytics = &self.clients.analytics;
        let status = match verb {
            Verb::Start => {
                self.timed(analytics.start_analytics_instance(&resource.identifier)).await?
            }
            Verb::Stop => {
                self.timed(analytics.stop_analytics_instance(&resource.identifier)).await?
            }
        };
        info!(
            resource = %resource.identifier,
            kind = %resource.resource_type,
            action = verb.as_str(),
            status = %status,
            "analytics instance action issued"
        );
        Ok(())
    }

    async fn handle_integration(&self, task: &Task) -> Result<(), HandlerError> {
        let resource = &task.resource;
        let Some(verb) = decide(
            task.action,
            &resource.lifecycle_state,
            PLATFORM_STOP_GUARD,
            PLATFORM_START_GUARD,
        ) else {
            return Ok(no_op(resource, task.action));
        };

        let integration = &self.clients.integration;
        let status = match verb {
            Verb::Start => {
                self.timed(integration.start_integration_instance(&resource.identifier)).await?
            }
            Verb::Stop => {
                self.timed(integration.stop_integration_instance(&resource.identifier)).await?
            }
        };
        info!(
            resource = %resource.identifier,
            kind = %resource.resource_type,
            action = verb.as_str(),
            status = %status,
            "integration instance action issued"
        );
        Ok(())
    }

    /// Runs one control-plane call under the scoped timeout.
    async fn timed<T, F>(&self, call: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, CloudError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(HandlerError::CallTimeout { after: self.call_timeout }),
        }
    }
}

impl std::fmt::Debug for ResourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandler")
            .field("pool", &self.pool)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Start,
    Stop,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

/// Picks the transition for an exact ON/OFF decision, or `None` when the
/// guard set says the resource is already where the decision wants it.
/// Custom decisions have no lifecycle mapping and fall through to no-op.
fn decide(action: Action, state: &str, stop_guard: &[&str], start_guard: &[&str]) -> Option<Verb> {
    if action == Action::OFF && !state_in(state, stop_guard) {
        Some(Verb::Stop)
    } else if action == Action::ON && !state_in(state, start_guard) {
        Some(Verb::Start)
    } else {
        None
    }
}

fn state_in(state: &str, guard: &[&str]) -> bool {
    guard.iter().any(|g| g.eq_ignore_ascii_case(state))
}

fn no_op(resource: &ResourceSummary, action: Action) {
    info!(
        resource = %resource.identifier,
        kind = %resource.resource_type,
        state = %resource.lifecycle_state,
        action = %action,
        "no action required"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::cloud::fake::{summary, FakeCloud};
    use crate::cloud::{ApiStatus, ClientFactory, DatabaseClient};

    fn handler_for(cloud: &FakeCloud) -> ResourceHandler {
        let set = cloud.client_set();
        set.set_region("us-ashburn-1");
        ResourceHandler::new(HandlerOpts::new(set))
    }

    fn task(action: Action, kind: ResourceKind, state: &str) -> Task {
        Task {
            action,
            resource: summary("ocid1.res.oc1..r1", kind, state, "Schedule", &[]),
        }
    }

    #[tokio::test]
    async fn off_on_stopped_instance_is_a_guarded_no_op() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::OFF, ResourceKind::Instance, "STOPPED"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn on_running_instance_is_a_guarded_no_op() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::ON, ResourceKind::Instance, "RUNNING"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn off_stops_a_running_instance() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::OFF, ResourceKind::Instance, "RUNNING"))
            .await
            .unwrap();

        let calls = cloud.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "compute");
        assert_eq!(calls[0].action, "STOP");
    }

    #[tokio::test]
    async fn terminating_resources_are_left_alone() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        for state in ["TERMINATING", "TERMINATED"] {
            handler
                .handle(&task(Action::ON, ResourceKind::Instance, state))
                .await
                .unwrap();
            handler
                .handle(&task(Action::OFF, ResourceKind::Instance, state))
                .await
                .unwrap();
        }
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn custom_decisions_have_no_lifecycle_mapping() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::custom(5), ResourceKind::Instance, "RUNNING"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_kinds_are_skipped() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::OFF, ResourceKind::Other("Bucket".into()), "ACTIVE"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn analytics_uses_inactive_as_its_stopped_state() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::OFF, ResourceKind::AnalyticsInstance, "Inactive"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());

        handler
            .handle(&task(Action::OFF, ResourceKind::AnalyticsInstance, "ACTIVE"))
            .await
            .unwrap();
        let calls = cloud.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "analytics");
        assert_eq!(calls[0].action, "STOP");
    }

    #[tokio::test]
    async fn autonomous_available_counts_as_running() {
        let cloud = FakeCloud::new();
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::ON, ResourceKind::AutonomousDatabase, "AVAILABLE"))
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());

        handler
            .handle(&task(Action::ON, ResourceKind::AutonomousDatabase, "STOPPED"))
            .await
            .unwrap();
        assert_eq!(cloud.calls().len(), 1);
        assert_eq!(cloud.calls()[0].action, "START");
    }

    #[tokio::test]
    async fn db_system_expands_and_acts_per_node() {
        let cloud = FakeCloud::new();
        cloud.add_db_node(
            "ocid1.res.oc1..r1",
            summary("node-1", ResourceKind::DbNode, "RUNNING", "Schedule", &[]),
        );
        cloud.add_db_node(
            "ocid1.res.oc1..r1",
            summary("node-2", ResourceKind::DbNode, "STOPPED", "Schedule", &[]),
        );
        let handler = handler_for(&cloud);

        handler
            .handle(&task(Action::OFF, ResourceKind::DbSystem, "AVAILABLE"))
            .await
            .unwrap();

        // Only the running node gets a call; the stopped one is guarded.
        let calls = cloud.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "node-1");
        assert_eq!(calls[0].action, "STOP");
    }

    #[tokio::test]
    async fn db_node_failures_are_joined_not_fatal_to_siblings() {
        struct FlakyDatabase {
            inner: Arc<dyn DatabaseClient>,
        }

        #[async_trait]
        impl DatabaseClient for FlakyDatabase {
            async fn db_node_action(
                &self,
                node_id: &str,
                action: NodeAction,
            ) -> Result<ApiStatus, CloudError> {
                if node_id == "node-bad" {
                    return Err(CloudError::Status {
                        status: ApiStatus::new(500, "Internal Server Error"),
                    });
                }
                self.inner.db_node_action(node_id, action).await
            }

            async fn start_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
                self.inner.start_autonomous_database(id).await
            }

            async fn stop_autonomous_database(&self, id: &str) -> Result<ApiStatus, CloudError> {
                self.inner.stop_autonomous_database(id).await
            }

            fn set_region(&self, region: &str) {
                self.inner.set_region(region);
            }
        }

        let cloud = FakeCloud::new();
        cloud.add_db_node(
            "ocid1.res.oc1..r1",
            summary("node-bad", ResourceKind::DbNode, "RUNNING", "Schedule", &[]),
        );
        cloud.add_db_node(
            "ocid1.res.oc1..r1",
            summary("node-good", ResourceKind::DbNode, "RUNNING", "Schedule", &[]),
        );

        let mut set = cloud.client_set();
        set.database = Arc::new(FlakyDatabase { inner: set.database.clone() });
        set.set_region("us-ashburn-1");
        let handler = ResourceHandler::new(HandlerOpts::new(set));

        let err = handler
            .handle(&task(Action::OFF, ResourceKind::DbSystem, "AVAILABLE"))
            .await
            .unwrap_err();

        match err {
            HandlerError::NodeActions { total, reasons, .. } => {
                assert_eq!(total, 2);
                assert_eq!(reasons.len(), 1);
                assert!(reasons[0].contains("node-bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The sibling was still acted on.
        assert_eq!(cloud.calls_for("node-good").len(), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_surfaces_as_rate_limit() {
        let cloud = FakeCloud::new();
        let set = cloud.client_set();
        set.set_region("us-ashburn-1");
        let handler = ResourceHandler::new(
            HandlerOpts::new(set)
                .max_requests(1)
                .refill_interval(Duration::from_secs(30))
                .acquire_timeout(Duration::from_millis(20)),
        );

        handler
            .handle(&task(Action::OFF, ResourceKind::Instance, "RUNNING"))
            .await
            .unwrap();

        let err = handler
            .handle(&task(Action::OFF, ResourceKind::Instance, "RUNNING"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::RateLimited(_)));
        assert_eq!(cloud.calls().len(), 1);
    }
}
