use anyhow::{Context, Result};
use heat_ctrl::{config, controller, hardware, ingest, telemetry};
use config::Config;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load()?
        .validate()
        .context("invalid configuration")?;

    info!(
        location = %cfg.location.name,
        timezone = %cfg.timezone,
        rooms = cfg.rooms.len(),
        url = %cfg.stream.url,
        "starting heat controller"
    );

    let discovery = hardware::WemoDiscovery::new(hardware::SSDP_MULTICAST, cfg.discovery_timeout)?;
    let mut factory = hardware::SwitchFactory::with_discovery(discovery);
    let heat = controller::HeatController::from_config(&cfg, &mut factory).await?;
    let mut supervisor = ingest::Supervisor::new(heat, cfg.stream.clone())?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        trigger.cancel();
    });

    supervisor.run(cancel).await;

    for room in supervisor.controller().rooms() {
        info!(room = room.name(), state = ?room.tracked_state(), "final room state");
    }
    warn!("shutdown complete");
    Ok(())
}
