use anyhow::Result;
use std::sync::Arc;
use tempmon::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(
        sample_store::SqliteStore::connect(
            &app_config.store.path,
            app_config.store.max_pool_size,
        )
        .await?,
    );
    store.init().await?;

    let sweeper = Arc::new(retention_worker::Sweeper::new(
        store.clone(),
        app_config.retention.sweeper_config(),
    ));
    let schedule = app_config.retention.sweep_schedule()?;
    tracing::info!(
        cron = %schedule.cron,
        utc_offset = %schedule.utc_offset,
        horizon_days = app_config.retention.horizon_days,
        "retention sweep scheduled"
    );
    let sweep_handle = retention_worker::spawn(sweeper, schedule)?;

    let fetcher = Arc::new(history_fetcher::HistoryFetcher::new(
        store.clone(),
        app_config.history.tier_policy(),
        app_config.history.query_timeout(),
    ));

    let app = routes::app(store, fetcher);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }
    sweep_handle.cancel().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
