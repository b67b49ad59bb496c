//! Frugal - main entry point.
//!
//! Parses the option surface (flag > `FRUGAL_` environment > default),
//! initializes tracing, resolves credentials, and runs one scan across the
//! effective regions.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;

use frugal::cloud::rest::{RestClientFactory, SessionTokenAuthorizer};
use frugal::config::{Options, Settings};
use frugal::logging::{self, LogFormat};
use frugal::runtime::Orchestrator;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments. Every flag falls back to its `FRUGAL_`
/// environment variable, then to the default.
#[derive(Parser, Debug)]
#[command(name = "frugal")]
#[command(about = "Tag-driven power scheduler for OCI resources")]
#[command(version)]
struct Args {
    /// Log level [debug, info, warn, error].
    #[arg(long, env = "FRUGAL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format [text, json].
    #[arg(long, env = "FRUGAL_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Filter which decisions are dispatched [all, on, off].
    #[arg(long, env = "FRUGAL_ACTION_TYPE", default_value = "all")]
    action: String,

    /// Authentication type [api_key, instance_principal,
    /// resource_principal, workload_principal].
    #[arg(long = "auth", env = "FRUGAL_AUTH_TYPE", default_value = "api_key")]
    auth_type: String,

    /// Credential file location (api_key only).
    #[arg(long = "config", env = "FRUGAL_FILE", default_value = "~/.oci/config")]
    config_file: String,

    /// Credential file profile (api_key only).
    #[arg(long, env = "FRUGAL_PROFILE", default_value = "DEFAULT")]
    profile: String,

    /// Private key password (api_key only).
    #[arg(long = "pass", env = "FRUGAL_KEY_PASS")]
    key_pass: Option<String>,

    /// Tag namespace containing the schedule keys.
    #[arg(short = 't', long, env = "FRUGAL_TAG_NAMESPACE", default_value = "Schedule")]
    tag_namespace: String,

    /// Region to run on; defaults to every subscribed region.
    #[arg(short = 'r', long, env = "FRUGAL_REGION")]
    region: Option<String>,

    /// Timezone schedules are evaluated in [ex. America/New_York].
    #[arg(long = "tz", env = "FRUGAL_TIMEZONE")]
    timezone: Option<String>,

    /// Restrict the scan to one compartment.
    #[arg(short = 'c', long, env = "FRUGAL_COMPARTMENT")]
    compartment: Option<String>,

    /// Exclude one compartment from the scan.
    #[arg(short = 'e', long, env = "FRUGAL_EXCLUDE_COMPARTMENT")]
    exclude_compartment: Option<String>,

    /// Control-plane calls admitted per refill interval, per region.
    #[arg(long, env = "FRUGAL_MAX_REQUESTS", default_value_t = 8)]
    max_requests: usize,
}

impl From<Args> for Options {
    fn from(args: Args) -> Self {
        Options {
            log_level: args.log_level,
            log_format: args.log_format,
            action: args.action,
            auth: args.auth_type,
            config_file: args.config_file,
            profile: args.profile,
            key_pass: args.key_pass,
            tag_namespace: args.tag_namespace,
            region: args.region,
            timezone: args.timezone,
            compartment: args.compartment,
            exclude_compartment: args.exclude_compartment,
            max_requests: args.max_requests,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    logging::init(&args.log_level, LogFormat::from_word(&args.log_format));

    let settings = match Settings::resolve(args.into()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "error loading configuration");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    tracing::info!("frugal started");
    tracing::debug!(
        region = settings.region.as_deref().unwrap_or("<subscribed>"),
        namespace = %settings.tag_namespace,
        principal = %settings.principal,
        allowed = %settings.allowed,
        timezone = settings.timezone.map(|tz| tz.name()).unwrap_or("<local>"),
        "initialized with settings"
    );

    let authorizer = Arc::new(SessionTokenAuthorizer::new(
        settings.credentials.session_token.clone().unwrap_or_default(),
    ));
    let factory = RestClientFactory::new(authorizer, settings.credentials.region.clone());
    let orchestrator = Orchestrator::new(settings, Arc::new(factory));

    tokio::select! {
        result = orchestrator.run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            tracing::warn!("interrupt received, shutting down");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }
}
