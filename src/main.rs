//! reward-burner service entry point.
//!
//! Wires the record store and capabilities, starts the scheduler, and
//! serves the read API and event feed when enabled.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use reward_burner::api;
use reward_burner::app_state::AppState;
use reward_burner::capability::Capabilities;
use reward_burner::config::{BurnerConfig, LogFormat, RunMode, StoreBackend};
use reward_burner::domain::EventBus;
use reward_burner::error::PipelineError;
use reward_burner::persistence::{FileStore, MemoryStore, PostgresStore, RecordStore, Records};
use reward_burner::service::{Scheduler, Services};
use reward_burner::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = BurnerConfig::from_env()?;

    // Initialize tracing
    init_tracing(config.log_format);
    tracing::info!(
        run_mode = config.run_mode.as_str(),
        store = ?config.store_backend,
        "starting reward-burner"
    );

    // Build persistence layer
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(
            FileStore::open(config.store_dir.clone())
                .await
                .context("opening file record store")?,
        ),
        StoreBackend::Postgres => Arc::new(
            PostgresStore::connect(&config)
                .await
                .context("connecting postgres record store")?,
        ),
    };
    let records = Records::new(store);

    // Build capability bindings
    let capabilities = match config.run_mode {
        RunMode::Simulation => Capabilities::simulated(&config),
        RunMode::Live => {
            return Err(PipelineError::Configuration(
                "live mode needs ledger, swap and oracle bindings; this binary ships only simulated ones".into(),
            )
            .into());
        }
    };

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let services = Services::new(
        &config,
        &capabilities,
        &records,
        &event_bus,
        Some(shutdown_rx.clone()),
    );

    let scheduler = Scheduler::new(
        &config,
        Arc::clone(&services.orchestrator),
        Arc::clone(&services.reconciler),
    );
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    if config.api_enabled {
        let app_state = AppState {
            records,
            orchestrator: services.orchestrator,
            reconciler: services.reconciler,
            event_bus,
            run_mode: config.run_mode,
        };

        let app = Router::new()
            .merge(api::build_router())
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
        tracing::info!(addr = %config.listen_addr, "server listening");

        let signal_tx = shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                wait_for_ctrl_c().await;
                let _ = signal_tx.send(true);
            })
            .await?;
    } else {
        wait_for_ctrl_c().await;
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }
    tracing::info!("reward-burner stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}
