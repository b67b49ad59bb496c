//! Schedule evaluation.
//!
//! A [`Scheduler`] turns a resource's schedule tags (or a raw schedule
//! string) into an [`Action`] for the current hour. The tag-driven variant
//! in [`tag`] implements the priority ruleset; the null variant always
//! abstains and is the controller's fallback when no evaluator was wired.

pub mod error;
pub mod tag;

pub use error::ScheduleError;
pub use tag::{TagScheduler, HOURS_PER_DAY};

use std::collections::HashMap;

use chrono_tz::Tz;
use serde_json::Value;

use crate::action::Action;

/// Input to [`Scheduler::evaluate`].
///
/// Schedules arrive either as a raw 24-token string (already resolved) or
/// as the tag map attached to a resource under the configured namespace.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleInput<'a> {
    /// A raw schedule string, parsed directly.
    Schedule(&'a str),
    /// Schedule tags, resolved through the priority rules first.
    Tags(&'a HashMap<String, Value>),
}

impl<'a> From<&'a str> for ScheduleInput<'a> {
    fn from(raw: &'a str) -> Self {
        Self::Schedule(raw)
    }
}

impl<'a> From<&'a HashMap<String, Value>> for ScheduleInput<'a> {
    fn from(tags: &'a HashMap<String, Value>) -> Self {
        Self::Tags(tags)
    }
}

/// A schedule evaluator.
#[derive(Debug, Clone)]
pub enum Scheduler {
    /// The tag-priority matcher.
    Tag(TagScheduler),
    /// Always abstains.
    Null,
}

impl Scheduler {
    /// Decides the action for `input` at the evaluator's captured hour.
    pub fn evaluate(&self, input: ScheduleInput<'_>) -> Result<Action, ScheduleError> {
        match self {
            Self::Tag(sch) => sch.evaluate(input),
            Self::Null => Ok(Action::NULL),
        }
    }

    /// Resolves today's active schedule string (empty when nothing matches).
    pub fn active_schedule(&self, tags: &HashMap<String, Value>) -> Result<String, ScheduleError> {
        match self {
            Self::Tag(sch) => sch.active_schedule(tags),
            Self::Null => Ok(String::new()),
        }
    }

    /// Returns a new evaluator recalculated for `zone`.
    #[must_use]
    pub fn with_timezone(&self, zone: Tz) -> Scheduler {
        match self {
            Self::Tag(sch) => Self::Tag(sch.with_timezone(zone)),
            Self::Null => Self::Null,
        }
    }

    /// The evaluator's capability name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tag(_) => "anykeynl",
            Self::Null => "null",
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::Null
    }
}
