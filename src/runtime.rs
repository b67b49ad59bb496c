//! Run orchestration.
//!
//! Resolves the effective region set, builds one controller per region with
//! its own client set and handler, runs them in parallel and waits for all
//! of them. A failed region is logged and never aborts its siblings.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::cloud::{ClientFactory, CloudError};
use crate::config::Settings;
use crate::controller::{ControllerOpts, RegionController};
use crate::handler::{HandlerOpts, ResourceHandler};
use crate::scheduler::Scheduler;
use crate::search::Search;

/// Kinds the catalog query covers, logged at startup.
pub const SUPPORTED_SERVICES: &str =
    "instance, dbsystem, autonomousdatabase, analyticsinstance, integrationinstance";

/// A run that could not start.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Region enumeration produced nothing to scan.
    #[error("no subscribed regions resolved")]
    NoRegions,

    /// The identity service could not list subscriptions.
    #[error("region enumeration failed: {0}")]
    Identity(#[from] CloudError),
}

/// Drives one full scan across every effective region.
pub struct Orchestrator {
    settings: Settings,
    factory: Arc<dyn ClientFactory>,
    scheduler: Scheduler,
}

impl Orchestrator {
    #[must_use]
    pub fn new(settings: Settings, factory: Arc<dyn ClientFactory>) -> Self {
        let scheduler = settings.scheduler();
        Self { settings, factory, scheduler }
    }

    /// Replaces the evaluator, pinning the decision instant.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Scans every effective region in parallel.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        info!(services = SUPPORTED_SERVICES, "supported services");

        let regions = self.resolve_regions().await?;
        let scheduler = &self.scheduler;
        info!(
            regions = regions.len(),
            scheduler = scheduler.kind(),
            allowed = %self.settings.allowed,
            "starting scan"
        );

        let total = regions.len();
        let mut joins = Vec::with_capacity(total);
        for (order, region) in regions.into_iter().enumerate() {
            info!(region = %region, order, total, "begin scaling in region");

            // Controllers rebind client regions, so each gets a fresh set.
            let clients = self.factory.client_set();
            let search = Search::new(clients.search.clone());
            let handler = Arc::new(ResourceHandler::new(
                HandlerOpts::new(clients).max_requests(self.settings.max_requests),
            ));
            let controller = RegionController::new(
                ControllerOpts::new(&region, &self.settings.tag_namespace, handler, search)
                    .scheduler(scheduler.clone())
                    .allowed(self.settings.allowed)
                    .compartment(self.settings.compartment.clone())
                    .exclude_compartment(self.settings.exclude_compartment.clone()),
            );

            joins.push(tokio::spawn(async move { (region, controller.run().await) }));
        }

        for join in futures::future::join_all(joins).await {
            match join {
                Ok((region, Ok(summary))) => {
                    debug!(
                        region = %region,
                        dispatched = summary.dispatched,
                        failed = summary.failed,
                        "region finished"
                    );
                }
                Ok((region, Err(e))) => {
                    error!(region = %region, error = %e, "region scan aborted");
                }
                Err(e) => {
                    error!(error = %e, "region task aborted");
                }
            }
        }

        info!("scan finished");
        Ok(())
    }

    /// An explicitly configured region wins; otherwise ask the identity
    /// service for the tenancy's subscriptions.
    async fn resolve_regions(&self) -> Result<Vec<String>, RuntimeError> {
        if let Some(region) = &self.settings.region {
            debug!(region = %region, "region pinned by configuration");
            return Ok(vec![region.clone()]);
        }

        let identity = self.factory.identity();
        let regions = identity
            .list_subscribed_regions(&self.settings.credentials.tenancy)
            .await?;
        debug!(?regions, "subscribed regions");

        if regions.is_empty() {
            return Err(RuntimeError::NoRegions);
        }
        Ok(regions)
    }
}
