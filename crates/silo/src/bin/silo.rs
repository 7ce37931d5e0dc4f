use std::process::ExitCode;
use std::sync::Arc;

use fileindex::{CacheStore, DirectoryScanner, MagicSniffer, SyncScheduler};
use silo::{Server, ServerError, ServerResult, ServerState, SiloConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "silo stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ServerResult<()> {
    let config = SiloConfig::from_env()?;
    tracing::info!(
        base = %config.base_dir.display(),
        interval_secs = config.sync_interval.as_secs(),
        "starting silo"
    );

    let store = Arc::new(CacheStore::new());
    let scheduler = SyncScheduler::new(
        store.clone(),
        DirectoryScanner::try_new(&config.base_dir)?,
        Arc::new(MagicSniffer),
    )
    .with_config(config.sync_config());

    // Serve a populated cache from the first request on.
    let (scheduler, primed) = tokio::task::spawn_blocking(move || {
        let report = scheduler.run_cycle();
        (scheduler, report)
    })
    .await
    .map_err(|error| ServerError::Io(std::io::Error::other(error)))?;
    let primed = primed?;
    tracing::info!(
        entries = primed.total,
        elapsed_ms = primed.elapsed.as_millis() as u64,
        "initial scan complete"
    );

    // The store is already current, so the loop starts with a sleep.
    let sync = scheduler.spawn_deferred()?;
    let state = Arc::new(
        ServerState::new(store, config.base_dir.clone()).with_sync_trigger(sync.trigger()),
    );
    let mut server = Server::start(state, config.listen_addr).await?;
    tracing::info!(addr = %server.addr(), "listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown();
    server.wait().await?;

    tokio::task::spawn_blocking(move || sync.shutdown())
        .await
        .map_err(|error| ServerError::Io(std::io::Error::other(error)))?;
    Ok(())
}
