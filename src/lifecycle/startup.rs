//! Startup sequence.
//!
//! # Data Flow
//! ```text
//! Cli ──▶ defaults ⊕ YAML ⊕ flags ──▶ logging ──▶ rule files ──▶ translate
//!                                                                   │
//!                                        Orchestrator::run ◀────────┘
//! ```
//!
//! # Design Decisions
//! - Fail fast: any error before the engines run is fatal
//! - Logging is configured from the merged settings, so the config file is
//!   reported only once logging is up
//! - Rule files are read after logging so their counts land in the log

use std::io;

use thiserror::Error;

use crate::cli::Cli;
use crate::config::loader::{load_file_layer, ConfigError};
use crate::config::schema::{Origin, SETTINGS};
use crate::config::validation::translate;
use crate::config::ResolvedSettings;
use crate::engine::{DnsConfig, DnsEngine, EngineError, TunnelConfig, TunnelEngine};
use crate::lifecycle::orchestrator::Orchestrator;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::logging::{init_logging, LoggingError};

/// Fatal startup or runtime error.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Merge defaults, the YAML file named by `--config` and the flags.
pub fn resolve_settings(cli: Cli) -> Result<ResolvedSettings, ConfigError> {
    let file = load_file_layer(&cli.config)?;
    Ok(ResolvedSettings::resolve(file, cli.into_layer()))
}

/// Append rule files and translate into engine configurations.
pub fn engine_configs(
    mut resolved: ResolvedSettings,
) -> Result<(DnsConfig, TunnelConfig), ConfigError> {
    resolved.merge_rule_files()?;
    tracing::info!("Running with options:\n{}", resolved.redacted_json());
    Ok(translate(&resolved)?)
}

fn log_sources(resolved: &ResolvedSettings) {
    match resolved.config_file() {
        Some(path) => tracing::info!(path = %path.display(), "Configuration file loaded"),
        None => tracing::info!("No configuration file found, using defaults and flags"),
    }

    for d in SETTINGS {
        match resolved.origin(d.name) {
            Some(Origin::Default) | None => {}
            Some(origin) => tracing::debug!(setting = d.name, %origin, "Setting overridden"),
        }
    }
}

/// Run the proxy from parsed flags until a termination signal arrives.
pub async fn run(cli: Cli) -> Result<(), StartupError> {
    let resolved = resolve_settings(cli)?;
    let settings = resolved.settings();
    let _guard = init_logging(settings.verbose, &settings.output)?;

    let result = serve(resolved).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Proxy stopped with an error");
    }
    result
}

async fn serve(resolved: ResolvedSettings) -> Result<(), StartupError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "redirect-proxy starting");
    log_sources(&resolved);

    let (dns, tunnel) = engine_configs(resolved)?;

    let shutdown = Shutdown::new();
    signals::listen(shutdown.clone()).map_err(StartupError::Signals)?;

    Orchestrator::new()
        .run(dns, tunnel, DnsEngine::build, TunnelEngine::build, shutdown)
        .await?;
    Ok(())
}
