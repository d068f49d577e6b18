use anyhow::{Context, Result};
use log::info;

use energy_meter_collector::cli::{build_cli, handle_subcommands};
use energy_meter_collector::{CollectorService, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = Config::from_matches(&matches).context("Failed to load configuration")?;

    if handle_subcommands(&matches, &config).await? {
        return Ok(());
    }

    let mut service = CollectorService::new(config)
        .await
        .context("Failed to initialize collector")?;
    service.start().await.context("Failed to start collector")?;

    info!("⌨️  Press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("🛑 Shutdown requested");
    service.stop().await;
    Ok(())
}
