//! Configuration error type.

use thiserror::Error;

/// A startup configuration failure. All of these are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported auth principal {0:?}")]
    UnknownPrincipal(String),

    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),

    #[error("cannot read credential file {path:?}: {source}")]
    CredentialFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profile {profile:?} not found in {path:?}")]
    MissingProfile { path: String, profile: String },

    #[error("profile {profile:?} is missing required entry {entry:?}")]
    MissingEntry { profile: String, entry: String },

    #[error("environment variable {0} is required for this principal")]
    MissingEnvironment(&'static str),
}

impl ConfigError {
    /// Process exit code for this failure: a bad time-zone from the
    /// environment exits 2, everything else 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidTimezone(_) => 2,
            _ => 1,
        }
    }
}
