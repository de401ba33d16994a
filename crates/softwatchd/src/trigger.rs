//! Remote recovery call: fires soft-error detection on the pixel
//! supervisor.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

/// Query parameter naming the state-machine transition to invoke.
const STATE_INPUT: (&str, &str) = ("StateInput", "DetectSoftError");

/// Result of one control invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Control endpoint answered; status code recorded, body ignored.
    Fired { status: u16 },
    /// Transport failed; logged, never propagated.
    TransportError,
    /// Dry-run mode, no request sent.
    DryRun,
}

pub struct ActionTrigger {
    http: reqwest::Client,
    control_url: String,
    dry_run: bool,
    cooldown: Duration,
}

impl ActionTrigger {
    pub fn new(
        control_url: String,
        timeout: Duration,
        dry_run: bool,
        cooldown: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("softwatchd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            control_url,
            dry_run,
            cooldown,
        })
    }

    /// Invoke soft-error detection on the supervisor.
    ///
    /// Transport failures are logged and reported, never raised. A live
    /// invocation is followed by the cool-down pause, so the next
    /// evaluation cannot re-trigger on data collected mid-recovery.
    pub async fn fire(&self, run_number: u32) -> TriggerOutcome {
        if self.dry_run {
            info!(
                "Dry-run: would trigger soft-error detection in run {}",
                run_number
            );
            return TriggerOutcome::DryRun;
        }

        let outcome = match self
            .http
            .get(&self.control_url)
            .query(&[STATE_INPUT])
            .send()
            .await
        {
            Ok(response) => {
                info!("Calling the following URL: {}", response.url());
                info!("Response from PixelSupervisor: {}", response.status());
                TriggerOutcome::Fired {
                    status: response.status().as_u16(),
                }
            }
            Err(e) => {
                error!("Control request error: {}", e);
                TriggerOutcome::TransportError
            }
        };

        // Wait a bit before the tick completes, so the next evaluation sees
        // post-recovery data.
        tokio::time::sleep(self.cooldown).await;
        outcome
    }
}
