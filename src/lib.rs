//! Menstrual cycle tracking backend.
//!
//! Cycle start/end reports are turned into cycle rows with derived period
//! and cycle lengths, symptoms are logged per day, and two background sweeps
//! notify users about periods that run long or cycles that are overdue.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::signal::{self, ctrl_c};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
pub mod sweep;

use clock::{Clock, SystemClock};
use config::Config;
use notify::{LogNotifier, Notifier, PushGatewayNotifier};
use state::AppState;
use store::{CycleStore, PgStore};
use sweep::{LateCycleSweep, LongPeriodSweep, SweepJob, SweepScheduler};

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::cycle::routes(state.clone()))
        .merge(routes::symptoms::routes(state.clone()))
        .merge(routes::cycle_stats::routes(state))
        .route("/health", get(|| async { "✅ Backend up" }))
}

fn notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.push_gateway_url {
        Some(url) => {
            let notifier = PushGatewayNotifier::new(
                url.clone(),
                config.push_gateway_key.clone(),
                config.push_timeout,
            )?;
            Ok(Arc::new(notifier))
        }
        None => {
            tracing::warn!("PUSH_GATEWAY_URL not set, notifications will not be delivered");
            Ok(Arc::new(LogNotifier))
        }
    }
}

pub fn sweeps(
    config: &Config,
    store: Arc<dyn CycleStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> Vec<Arc<dyn SweepJob>> {
    vec![
        Arc::new(LongPeriodSweep::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            config.long_period_days,
        )) as Arc<dyn SweepJob>,
        Arc::new(LateCycleSweep::new(store, notifier, clock, config.late_cycle_days)),
    ]
}

pub async fn start_server() -> Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    info!("Connecting to database...");
    let store: Arc<dyn CycleStore> =
        Arc::new(PgStore::connect(&config.database_url, config.max_connections).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let notifier = notifier(&config)?;
    let scheduler = SweepScheduler::start(
        &config.sweep_cadence,
        sweeps(&config, Arc::clone(&store), notifier, Arc::clone(&clock)),
    )
    .await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, store, clock);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🧠 Server running at {}", addr);

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
