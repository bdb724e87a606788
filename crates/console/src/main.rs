//! Fleet console - reconciled view of the cluster fleet
//!
//! Periodically reconciles the inventory store with the live cluster,
//! serves the reconciled streams and dispatches operator commands.

use anyhow::{Context, Result};
use fleet_console::{api, config::ConsoleConfig, sessions::SessionBoard};
use fleet_core::{
    command::CommandDispatcher,
    convergence::ReadinessPoller,
    health::HealthRegistry,
    observability::{AuditLogger, FleetMetrics},
    reconcile::{Reconciler, RefreshLoopBuilder},
    source::HttpBackend,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONSOLE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleet-console");

    let config = ConsoleConfig::load()?;
    info!(
        backend = %config.backend_url,
        api_port = config.api_port,
        streams = config.refresh_streams.len(),
        "Console configured"
    );

    let health_registry = HealthRegistry::with_console_components().await;
    let _metrics = FleetMetrics::new();

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "fleet-console".to_string());
    let audit = AuditLogger::new(&instance);
    audit.log_startup(CONSOLE_VERSION, &config.backend_url);

    let backend = Arc::new(
        HttpBackend::builder(config.backend_url.clone())
            .request_timeout(config.request_timeout())
            .build()
            .context("Invalid backend URL")?,
    );

    let reconciler = Arc::new(
        Reconciler::builder()
            .sources(backend.clone())
            .health(health_registry.clone())
            .build()?,
    );

    let poller = ReadinessPoller::with_guard(reconciler.clone(), reconciler.guard());
    let dispatcher = Arc::new(
        CommandDispatcher::builder()
            .backend(backend)
            .reconciler(reconciler.clone())
            .poller(poller)
            .config(config.dispatch_config())
            .health(health_registry.clone())
            .instance(&instance)
            .build()?,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let refresh = RefreshLoopBuilder::new()
        .reconciler(reconciler.clone())
        .streams(config.refresh_streams.iter().copied())
        .interval(config.refresh_interval())
        .build()?;
    let refresh_handle = tokio::spawn(refresh.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry,
        reconciler,
        dispatcher,
        SessionBoard::with_retention(audit.clone(), config.session_retention()),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            audit.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "Console API stopped"),
                Err(e) => error!(error = %e, "Console API task failed"),
                Ok(Ok(())) => {}
            }
            audit.log_shutdown("API server stopped");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = refresh_handle.await;
    info!("Shutting down");

    Ok(())
}
