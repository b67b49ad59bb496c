//! Run configuration.
//!
//! Resolution order is flag > `FRUGAL_`-prefixed environment > default;
//! the CLI layer applies that precedence and hands the raw words here.
//! [`Settings::resolve`] validates them, loads the credential view for the
//! selected principal, and produces the one handle every component
//! downstream consumes.

pub mod error;
pub mod principal;

pub use error::ConfigError;
pub use principal::{load_profile, CredentialProfile, Credentials, Principal};

use std::str::FromStr;

use chrono_tz::Tz;

use crate::action::Action;
use crate::logging::LogFormat;
use crate::scheduler::{Scheduler, TagScheduler};

/// Raw option words, after flag/env/default precedence.
#[derive(Debug, Clone)]
pub struct Options {
    pub log_level: String,
    pub log_format: String,
    pub action: String,
    pub auth: String,
    pub config_file: String,
    pub profile: String,
    pub key_pass: Option<String>,
    pub tag_namespace: String,
    pub region: Option<String>,
    pub timezone: Option<String>,
    pub compartment: Option<String>,
    pub exclude_compartment: Option<String>,
    pub max_requests: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            action: "all".into(),
            auth: "api_key".into(),
            config_file: "~/.oci/config".into(),
            profile: "DEFAULT".into(),
            key_pass: None,
            tag_namespace: "Schedule".into(),
            region: None,
            timezone: None,
            compartment: None,
            exclude_compartment: None,
            max_requests: 8,
        }
    }
}

/// Validated process configuration. Built once per run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Decisions allowed to be dispatched.
    pub allowed: Action,
    pub principal: Principal,
    /// Namespace under `defined_tags` carrying the schedule keys.
    pub tag_namespace: String,
    /// Pinned region; `None` scans every subscribed region.
    pub region: Option<String>,
    /// Evaluation zone; `None` uses the host-local clock.
    pub timezone: Option<Tz>,
    pub compartment: Option<String>,
    pub exclude_compartment: Option<String>,
    /// Control-plane calls admitted per refill interval, per region.
    pub max_requests: usize,
    pub credentials: Credentials,
}

impl Settings {
    /// Validates `options` and loads credentials for the selected
    /// principal.
    pub fn resolve(options: Options) -> Result<Self, ConfigError> {
        let principal = Principal::from_str(&options.auth)?;

        let timezone = match &options.timezone {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|_| ConfigError::InvalidTimezone(name.clone()))?,
            ),
            None => None,
        };

        let credentials = Credentials::resolve(
            principal,
            &options.config_file,
            &options.profile,
            options.key_pass,
        )?;

        let region = options
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(Self {
            log_level: options.log_level,
            log_format: LogFormat::from_word(&options.log_format),
            allowed: Action::from_word(&options.action),
            principal,
            tag_namespace: options.tag_namespace,
            region,
            timezone,
            compartment: options.compartment,
            exclude_compartment: options.exclude_compartment,
            max_requests: options.max_requests.max(1),
            credentials,
        })
    }

    /// Builds the evaluator for this run, honoring the configured zone.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        match self.timezone {
            Some(zone) => Scheduler::Tag(TagScheduler::in_zone(zone)),
            None => Scheduler::Tag(TagScheduler::local()),
        }
    }
}
