//! Frugal - tag-driven power scheduling for OCI resources.
//!
//! Once an hour, frugal enumerates the supported resource kinds across the
//! subscribed regions of a tenancy, reads each resource's schedule tags,
//! decides whether the resource should be powered on or off at the current
//! wall-clock hour, and issues the matching lifecycle action through the
//! control plane - fanned out concurrently and rate-limited per region.
//!
//! # Architecture
//!
//! - [`config`]: option resolution, principal selection, credential view
//! - [`action`]: the decision bitset and compatibility test
//! - [`scheduler`]: the priority-ordered tag matcher and schedule parser
//! - [`cloud`]: control-plane contracts, REST clients, and the fake cloud
//! - [`search`]: the paginated catalog search facade
//! - [`pool`]: the refilling token pool bounding control-plane concurrency
//! - [`handler`]: the kind-dispatched, idempotent lifecycle executor
//! - [`controller`]: the per-region search -> queue -> worker pipeline
//! - [`runtime`]: region resolution and the parallel scan across regions
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use frugal::cloud::rest::{RestClientFactory, SessionTokenAuthorizer};
//! use frugal::config::{Options, Settings};
//! use frugal::runtime::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::resolve(Options::default())?;
//!     let authorizer = Arc::new(SessionTokenAuthorizer::new(
//!         settings.credentials.session_token.clone().unwrap_or_default(),
//!     ));
//!     let factory = RestClientFactory::new(authorizer, settings.credentials.region.clone());
//!     Orchestrator::new(settings, Arc::new(factory)).run().await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod cloud;
pub mod config;
pub mod controller;
pub mod handler;
pub mod logging;
pub mod pool;
pub mod runtime;
pub mod scheduler;
pub mod search;
