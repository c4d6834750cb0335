//! Process entry point: load the declared state once, spawn one
//! device loop per host, then wait for ctrl-c and drain the loops.

use rosman::DeviceRunner;
use rosman_config::{Config, DEFAULT_CONFIG_PATH};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("ROSMAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("[init] loading \"{config_path}\" failed: {e}");
            std::process::exit(1);
        }
    };
    log::info!("[init] {} device(s) declared", config.devices.len());

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    for device in &config.devices {
        let runner = match DeviceRunner::new(&config, Arc::clone(device), cancel.clone()) {
            Ok(runner) => runner,
            Err(e) => {
                log::error!("[init] device \"{}\": {e}", device.device.name);
                std::process::exit(1);
            }
        };
        tracker.spawn(runner.run());
    }
    tracker.close();

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for the shutdown signal: {e}");
    }
    log::info!("shutting down, waiting for device loops to finish");
    cancel.cancel();
    tracker.wait().await;
}
