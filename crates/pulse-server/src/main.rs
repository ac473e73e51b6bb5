mod api;
mod middleware;
mod scheduler;
mod store;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use pulse_engine::{AssemblySettings, CycleSettings, Orchestrator};
use pulse_providers::ProviderRegistry;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    store::PgSnapshotStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(pulse_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let catalog = Arc::new(pulse_core::load_catalog(&config.catalog_path)?);

    let pool_config = pulse_db::PoolConfig::from_app_config(&config);
    let pool = pulse_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = pulse_db::run_migrations(&pool).await?;
    tracing::info!(applied, env = %config.env, "database ready");

    let registry = ProviderRegistry::from_config(&config, &catalog)?;
    tracing::info!(providers = ?registry.ids(), "provider registry built");

    let settings = CycleSettings {
        assembly: AssemblySettings {
            top_n: config.top_n,
            orphan_policy: config.orphan_policy,
        },
        max_concurrent_fetches: config.max_concurrent_fetches,
        provider_timeout: Duration::from_secs(config.provider_timeout_secs),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        Arc::new(PgSnapshotStore::new(pool.clone())),
        Arc::clone(&catalog),
        settings,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler = scheduler::build_scheduler(
        pool.clone(),
        Arc::clone(&orchestrator),
        &catalog,
        shutdown_rx.clone(),
    )
    .await?;

    spawn_startup_refresh(pool.clone(), Arc::clone(&orchestrator), shutdown_rx);

    let app = build_app(AppState { pool }, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Running cycles stop before their next publish.
            let _ = shutdown_tx.send(true);
        })
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

/// Refresh every scheduled category once so a fresh deployment does not
/// wait a full cadence for its first snapshots.
fn spawn_startup_refresh(
    pool: sqlx::PgPool,
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        for category in pulse_core::RankingCategory::ALL {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            if orchestrator.registry().for_category(category).is_empty() {
                continue;
            }
            scheduler::run_refresh(&pool, &orchestrator, category, "startup", &shutdown).await;
        }
        tracing::info!("startup refresh complete");
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
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
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
