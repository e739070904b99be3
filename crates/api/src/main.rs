//! Proctoring Service - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("loading service configuration")?;
    init_logging(&config.logging)?;

    info!("=== Proctoring Service v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Calibration {}s, grace {}s, cooldown {}s, persistent escalation {}",
        config.proctor.calibration_window_secs,
        config.proctor.critical_grace_secs,
        config.proctor.warning_cooldown_secs,
        config.proctor.escalate_persistent_warnings
    );

    run_server(config).await?;

    Ok(())
}
