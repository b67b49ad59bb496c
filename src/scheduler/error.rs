//! Evaluation error taxonomy.

use thiserror::Error;

/// Errors produced while resolving or decoding a schedule.
///
/// All of these are per-resource: the pipeline logs them and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// A tag value could not be coerced to a string.
    #[error("invalid input to scheduler: {input}")]
    InvalidInput { input: String },

    /// A schedule string did not carry exactly one token per hour.
    #[error("schedule must have {expected} tokens, got {got}")]
    InvalidTokenCount { expected: usize, got: usize },

    /// The token at the current hour was not a recognized integer.
    #[error("invalid schedule token {token:?}: {reason}")]
    InvalidToken { token: String, reason: String },

    /// Parenthesized tokens are reserved and not decoded at this layer.
    #[error("unsupported schedule token {token:?}")]
    UnsupportedToken { token: String },

    /// The configured time-zone name is not in the zone database.
    #[error("invalid timezone {name:?}")]
    InvalidTimezone { name: String },
}
