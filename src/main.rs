use anyhow::Context;

use labsync_lib::config::{self, SyncConfig};
use labsync_lib::core_state::CoreState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();
    labsync_lib::init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = SyncConfig::from_env().context("invalid configuration")?;
    let core = CoreState::build(config).context("failed to initialize services")?;

    let api = core.start_api().await.context("failed to start HTTP API")?;
    tracing::info!(addr = %api.server_addr, "Listening");
    core.start_scheduler().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    core.shutdown().await;
    Ok(())
}
