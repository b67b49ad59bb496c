//! Per-region scan pipeline.
//!
//! A [`RegionController`] owns one region for the duration of one scan:
//! it rebinds the client set, runs the catalog search, and fans the
//! discovered resources out over a bounded task queue to a fixed pool of
//! workers. Each worker evaluates the resource's schedule tags and, when
//! the decision is compatible with the controller's allowed actions, hands
//! the task to the resource handler. Failures never cross a resource
//! boundary.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::action::Action;
use crate::cloud::ResourceSummary;
use crate::handler::{ResourceHandler, Task};
use crate::scheduler::{ScheduleInput, Scheduler};
use crate::search::{Search, SearchError};

/// Workers per region; also the task queue depth, so at most
/// `2 * WORK_QUEUE_DEPTH` items are in flight per region.
pub const WORK_QUEUE_DEPTH: usize = 8;

const BASE_QUERY: &str = "query instance, dbsystem, autonomousdatabase, \
                          analyticsinstance, integrationinstance resources";

/// A region scan that could not even start.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The catalog search failed; the region is abandoned for this run.
    #[error("region search failed: {0}")]
    Search(#[from] SearchError),
}

/// Counters for one finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Resources returned by the catalog search.
    pub discovered: usize,
    /// Tasks handed to the handler that completed.
    pub dispatched: usize,
    /// Resources dropped before dispatch (no schedule, null decision,
    /// incompatible action, evaluation error).
    pub skipped: usize,
    /// Tasks whose handling returned an error.
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, stats: WorkerStats) {
        self.dispatched += stats.dispatched;
        self.skipped += stats.skipped;
        self.failed += stats.failed;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    dispatched: usize,
    skipped: usize,
    failed: usize,
}

/// Options for [`RegionController::new`]. Evaluator and allowed actions
/// are optional; everything else is required.
pub struct ControllerOpts {
    pub region: String,
    pub tag_namespace: String,
    pub handler: Arc<ResourceHandler>,
    pub search: Search,
    pub scheduler: Scheduler,
    pub allowed: Action,
    pub workers: usize,
    pub compartment: Option<String>,
    pub exclude_compartment: Option<String>,
}

impl ControllerOpts {
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        tag_namespace: impl Into<String>,
        handler: Arc<ResourceHandler>,
        search: Search,
    ) -> Self {
        Self {
            region: region.into(),
            tag_namespace: tag_namespace.into(),
            handler,
            search,
            scheduler: Scheduler::Null,
            allowed: Action::ALL,
            workers: WORK_QUEUE_DEPTH,
            compartment: None,
            exclude_compartment: None,
        }
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn allowed(mut self, allowed: Action) -> Self {
        self.allowed = allowed;
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn compartment(mut self, compartment: Option<String>) -> Self {
        self.compartment = compartment;
        self
    }

    #[must_use]
    pub fn exclude_compartment(mut self, exclude: Option<String>) -> Self {
        self.exclude_compartment = exclude;
        self
    }
}

/// Scans one region and dispatches schedule decisions.
///
/// Lives for a single [`Self::run`] and is discarded afterwards.
pub struct RegionController {
    region: String,
    namespace: String,
    handler: Arc<ResourceHandler>,
    search: Search,
    scheduler: Scheduler,
    allowed: Action,
    workers: usize,
    compartment: Option<String>,
    exclude_compartment: Option<String>,
}

impl RegionController {
    #[must_use]
    pub fn new(opts: ControllerOpts) -> Self {
        Self {
            region: opts.region,
            namespace: opts.tag_namespace,
            handler: opts.handler,
            search: opts.search,
            scheduler: opts.scheduler,
            allowed: opts.allowed,
            workers: opts.workers,
            compartment: opts.compartment,
            exclude_compartment: opts.exclude_compartment,
        }
    }

    fn query(&self) -> String {
        let mut query =
            format!("{BASE_QUERY} where definedTags.namespace = '{}'", self.namespace);
        if let Some(compartment) = &self.compartment {
            query.push_str(&format!(" && compartmentId = '{compartment}'"));
        }
        if let Some(excluded) = &self.exclude_compartment {
            query.push_str(&format!(" && compartmentId != '{excluded}'"));
        }
        query
    }

    /// Runs one full scan of the region.
    pub async fn run(&self) -> Result<RunSummary, ControllerError> {
        info!(
            region = %self.region,
            namespace = %self.namespace,
            scheduler = self.scheduler.kind(),
            allowed = %self.allowed,
            "beginning region scan"
        );

        self.handler.set_region(&self.region);

        let items = match self.search.search(&self.query()).await {
            Ok(items) => items,
            Err(e) => {
                error!(region = %self.region, error = %e, "region search failed");
                return Err(e.into());
            }
        };

        let mut summary = RunSummary { discovered: items.len(), ..RunSummary::default() };

        let (tx, rx) = mpsc::channel::<ResourceSummary>(self.workers);
        let rx = Arc::new(Mutex::new(rx));

        let mut joins = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let ctx = WorkerContext {
                queue: Arc::clone(&rx),
                namespace: self.namespace.clone(),
                scheduler: self.scheduler.clone(),
                allowed: self.allowed,
                handler: Arc::clone(&self.handler),
            };
            let span = info_span!("worker", region = %self.region, worker = id);
            joins.push(tokio::spawn(worker_loop(ctx).instrument(span)));
        }

        // The bounded channel provides back-pressure: the feed blocks while
        // every worker is busy and the queue is full.
        for item in items {
            if tx.send(item).await.is_err() {
                warn!(region = %self.region, "task queue closed early");
                break;
            }
        }
        drop(tx);

        for join in joins {
            match join.await {
                Ok(stats) => summary.absorb(stats),
                Err(e) => error!(region = %self.region, error = %e, "worker aborted"),
            }
        }

        info!(
            region = %self.region,
            discovered = summary.discovered,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            failed = summary.failed,
            "region scan complete"
        );
        Ok(summary)
    }
}

struct WorkerContext {
    queue: Arc<Mutex<mpsc::Receiver<ResourceSummary>>>,
    namespace: String,
    scheduler: Scheduler,
    allowed: Action,
    handler: Arc<ResourceHandler>,
}

/// Pulls resources until the queue closes. Evaluation precedes dispatch and
/// dispatch completes before the next item is pulled; the worker owns its
/// task outright, so no state is shared with its siblings.
async fn worker_loop(ctx: WorkerContext) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        let item = { ctx.queue.lock().await.recv().await };
        let Some(resource) = item else {
            break;
        };

        let Some(tags) = resource.tags_in(&ctx.namespace) else {
            debug!(resource = %resource.identifier, "no schedule tags, skipping");
            stats.skipped += 1;
            continue;
        };

        let active = match ctx.scheduler.active_schedule(tags) {
            Ok(active) => active,
            Err(e) => {
                warn!(
                    resource = %resource.identifier,
                    error = %e,
                    "could not resolve active schedule"
                );
                stats.skipped += 1;
                continue;
            }
        };

        let action = match ctx.scheduler.evaluate(ScheduleInput::Schedule(&active)) {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    resource = %resource.identifier,
                    schedule = %active,
                    error = %e,
                    "schedule evaluation failed"
                );
                stats.skipped += 1;
                continue;
            }
        };

        // Abstentions are dropped silently.
        if action == Action::NULL {
            stats.skipped += 1;
            continue;
        }

        if !ctx.allowed.compatible(action) {
            debug!(
                resource = %resource.identifier,
                decided = %action,
                allowed = %ctx.allowed,
                "decision filtered by allowed actions"
            );
            stats.skipped += 1;
            continue;
        }

        let task = Task { action, resource };
        match ctx.handler.handle(&task).await {
            Ok(()) => stats.dispatched += 1,
            Err(e) => {
                error!(
                    resource = %task.resource.identifier,
                    kind = %task.resource.resource_type,
                    state = %task.resource.lifecycle_state,
                    action = %task.action,
                    error = %e,
                    "resource handling failed"
                );
                stats.failed += 1;
            }
        }
    }

    stats
}
