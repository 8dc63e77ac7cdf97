//! wsbridge - OpenWeatherMap observations as smart-home sensor state
//!
//! Loads the platform configuration, restores persisted locations and runs
//! the heartbeat until interrupted or until `--beats` is reached.

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use wsbridge::cli::{Cli, StartupConfig};
use wsbridge::config::PlatformConfig;
use wsbridge::history::JsonlHistory;
use wsbridge::host::LogHost;
use wsbridge::platform::{Platform, PlatformContext};
use wsbridge::store::ContextStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = run(Cli::parse()).await;
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let startup = StartupConfig::from_cli(&cli)?;
    let config = PlatformConfig::from_file(&startup.config_path)?;
    info!(
        "{}: config {}, state in {}",
        config.name,
        startup.config_path.display(),
        startup.state_dir.display()
    );

    let context = Arc::new(PlatformContext::from_config(
        &config,
        Arc::new(LogHost),
        Arc::new(JsonlHistory::new(startup.history_dir())),
        Some(ContextStore::with_dir(startup.contexts_dir())),
    ));
    let mut platform = Platform::new(config, context);
    platform.init();

    let handle = platform.start(startup.beats);

    // Stop the heartbeat on Ctrl-C
    let stop = handle.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping");
            let _ = stop.send(()).await;
        }
    });

    handle.wait().await?;
    Ok(())
}
