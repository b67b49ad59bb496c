//! Tracing initialization.
//!
//! One structured sink for the whole process, configured once at startup.
//! `RUST_LOG` overrides the configured level when set; the handler renders
//! text for humans or JSON for log shippers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output encoding of the log handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Permissive parse: `json` selects JSON, anything else text.
    #[must_use]
    pub fn from_word(word: &str) -> Self {
        if word.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Normalizes a configured level word, falling back to `warn` on garbage
/// so a typo surfaces loudly rather than silencing the run.
#[must_use]
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "warn",
    }
}

/// Installs the global subscriber. Call once, before any spans open.
pub fn init(level: &str, format: LogFormat) {
    let normalized = normalize_level(level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(normalized));

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    if normalized != level.trim().to_ascii_lowercase() {
        tracing::warn!(given = level, used = normalized, "unrecognized log level");
    }
}
