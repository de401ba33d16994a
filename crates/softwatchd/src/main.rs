//! Softwatch daemon - automatic soft-error recovery for the pixel detector.
//!
//! Watches delivered luminosity through WBM and invokes DetectSoftError on
//! the pixel supervisor once the configured budget has been consumed since
//! the last invocation.

use anyhow::Result;
use softwatchd::config::Config;
use softwatchd::engine::DecisionEngine;
use softwatchd::poller::StatusPoller;
use softwatchd::scheduler::Scheduler;
use softwatchd::trigger::ActionTrigger;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("softwatchd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    info!(
        "Calling status loop every {} seconds",
        config.daemon.poll_interval_secs
    );
    info!(
        "Integrated luminosity threshold is {} pb-1",
        config.detection.lumi_threshold_pb
    );
    info!(
        "Trigger mode: {}",
        if config.detection.dry_run { "dry-run" } else { "live" }
    );

    let poller = StatusPoller::new(config.endpoints.clone(), config.request_timeout())?;
    let trigger = ActionTrigger::new(
        config.endpoints.control_url.clone(),
        config.request_timeout(),
        config.detection.dry_run,
        config.cooldown(),
    )?;
    let mut engine = DecisionEngine::new(poller, trigger, config.detection.lumi_threshold_pb);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down after the current evaluation");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                error!("Cannot listen for shutdown signal: {}", e);
                // Hold the stop handle so the scheduler keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    Scheduler::new(config.poll_interval())
        .run(&mut engine, stop_rx)
        .await;

    info!("softwatchd stopped");
    Ok(())
}
