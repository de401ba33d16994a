//! Remote status views: monitoring snapshot, supervisor state, historical
//! soft-error record.
//!
//! Pure I/O plus decode. Every failure is logged at this boundary and
//! surfaced as an empty or fail-closed value; the decision gates never see
//! a transport error.

use crate::config::EndpointConfig;
use crate::scrape;
use crate::wbm::{self, MonitoringSnapshot, WBM_TIME_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Pixel supervisor state, as reported by its status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    NotRunning,
}

/// Remote record of the last soft-error detection in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoricalTrigger {
    /// No detection recorded for the run.
    NotFound,
    /// Estimated integrated luminosity (pb^-1) delivered since the recorded
    /// detection, assuming the instantaneous rate held constant.
    SincePb(f64),
}

/// Poll failures, logged here and never raised past this module.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Decode(#[from] wbm::DecodeError),
}

pub struct StatusPoller {
    http: reqwest::Client,
    endpoints: EndpointConfig,
}

impl StatusPoller {
    pub fn new(endpoints: EndpointConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("softwatchd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, endpoints })
    }

    /// Fetch and decode one monitoring snapshot.
    ///
    /// Any transport or decode failure is logged and yields `None`; the
    /// caller must abort the tick.
    pub async fn fetch_snapshot(&self) -> Option<MonitoringSnapshot> {
        match self.request_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Monitoring snapshot unavailable: {}", e);
                None
            }
        }
    }

    async fn request_snapshot(&self) -> Result<MonitoringSnapshot, PollError> {
        let body = self
            .get_text(&self.endpoints.monitoring_url, &[("XML", "1")])
            .await?;
        Ok(wbm::decode_snapshot(&body)?)
    }

    /// Query the pixel supervisor status page.
    ///
    /// Fail-closed: a transport failure or an unrecognizable page counts as
    /// not running.
    pub async fn fetch_subsystem_state(&self) -> SupervisorState {
        let page = match self
            .get_text(&self.endpoints.supervisor_status_url, &[])
            .await
        {
            Ok(page) => page,
            Err(e) => {
                error!("Supervisor status page unavailable: {}", e);
                return SupervisorState::NotRunning;
            }
        };

        match scrape::supervisor_state(&page) {
            Some(state) => {
                debug!("PixelSupervisor status: {}", state);
                if state == scrape::RUNNING_STATE {
                    SupervisorState::Running
                } else {
                    SupervisorState::NotRunning
                }
            }
            None => {
                error!("Supervisor status page has no recognizable state line");
                SupervisorState::NotRunning
            }
        }
    }

    /// Look up the last soft-error detection recorded for `run_number` and
    /// estimate the integrated luminosity delivered since.
    ///
    /// `None` means the record could not be read at all; the caller must
    /// abort rather than risk a duplicate trigger.
    pub async fn fetch_historical_trigger(
        &self,
        run_number: u32,
        evaluation_time: NaiveDateTime,
        instant_lumi: f64,
    ) -> Option<HistoricalTrigger> {
        let run = run_number.to_string();
        let table = match self
            .get_text(&self.endpoints.run_parameters_url, &[("RUN", run.as_str())])
            .await
        {
            Ok(table) => table,
            Err(e) => {
                error!("Run-parameter table unavailable: {}", e);
                return None;
            }
        };

        let Some(raw_time) = scrape::last_soft_error_timestamp(&table) else {
            return Some(HistoricalTrigger::NotFound);
        };
        info!(
            "Last soft-error detection for run {} recorded at {}",
            run_number, raw_time
        );

        let detected_at = match NaiveDateTime::parse_from_str(&raw_time, WBM_TIME_FORMAT) {
            Ok(time) => time,
            Err(_) => {
                error!("Run-parameter timestamp {:?} is not in WBM time format", raw_time);
                return None;
            }
        };

        let elapsed_secs = (evaluation_time - detected_at).num_seconds() as f64;
        debug!("Seconds since last detection: {}", elapsed_secs);

        // From 1e30 cm^-2 s^-1 to pb^-1, assuming the rate held constant
        // since the detection.
        let since_pb = elapsed_secs * instant_lumi / 1e6;
        info!(
            "Pessimistic integrated luminosity since last detection: {} pb^-1",
            since_pb
        );
        Some(HistoricalTrigger::SincePb(since_pb))
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, PollError> {
        let response = self.http.get(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(PollError::Status(response.status()));
        }
        Ok(response.text().await?)
    }
}
