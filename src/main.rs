//! Blog API server.
//!
//! Startup order: `.env` → config file → environment overrides →
//! validation → logging → metrics → stores and services → listener.
//! Any configuration problem is fatal and exits with status 1.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use blog_api::config::{load_config, ConfigError};
use blog_api::lifecycle::signals::forward_signals;
use blog_api::observability::{logging, metrics};
use blog_api::{AppState, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "blog-api")]
#[command(about = "Blog API server", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long, env = "BLOG_API_CONFIG")]
    config: Option<PathBuf>,

    /// Validate configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), &mockable::DefaultEnv::new()) {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);

    if cli.check {
        tracing::info!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        environment = %config.security.environment,
        token_ttl_secs = config.auth.token_ttl_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "blog-api starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = match AppState::from_config(&config, Arc::new(mockable::DefaultClock)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                bind_address = %config.listener.bind_address,
                error = %e,
                "Failed to bind listener"
            );
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let server = HttpServer::new(config, state);
    if let Err(e) = server.run(listener, shutdown).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Logging is not configured yet when configuration fails, so install a
/// default subscriber first.
fn report_config_error(error: &ConfigError) {
    logging::init(&Default::default());
    match error {
        ConfigError::Validation(errors) => {
            for e in errors {
                tracing::error!(error = %e, "Invalid configuration");
            }
        }
        e => tracing::error!(error = %e, "Failed to load configuration"),
    }
}
