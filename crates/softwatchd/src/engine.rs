//! Decision engine: the ordered gate sequence and the one piece of retained
//! state.
//!
//! Each tick walks the gates in order; the first failing gate ends the tick
//! with no state change and no action. Only the terminal transition fires
//! the recovery call and moves the luminosity baseline.

use crate::poller::{HistoricalTrigger, StatusPoller, SupervisorState};
use crate::scheduler::Tick;
use crate::trigger::ActionTrigger;
use crate::wbm;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Snapshot freshness window relative to evaluation time, seconds.
/// A snapshot may run at most 1 s ahead of the clock and lag at most 20 s.
const MAX_SNAPSHOT_LEAD_SECS: f64 = 1.0;
const MAX_SNAPSHOT_LAG_SECS: f64 = 20.0;

/// Why a tick ended without firing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Monitoring endpoint gave no usable snapshot.
    NoSnapshot,
    /// Snapshot collection time is outside the freshness window.
    StaleSnapshot { age_secs: f64 },
    /// Beams are not in stable mode.
    BeamsNotStable,
    /// Pixel detector is not included in the run.
    PixelExcluded,
    /// Pixel supervisor is not in the Running state.
    SupervisorNotRunning,
    /// Run number or run luminosity did not parse.
    UnparseableRunData,
    /// Relative luminosity budget not yet consumed.
    BelowThreshold { passed_pb: f64, remaining_pb: f64 },
    /// Instantaneous luminosity is zero, no elapsed estimate is possible.
    ZeroInstantLumi,
    /// Run-parameter history could not be read.
    HistoryUnavailable,
    /// Remote record shows a recent enough detection already happened.
    RecentRemoteTrigger { since_pb: f64 },
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Triggered { run_number: u32, lumi_run: f64 },
}

pub struct DecisionEngine {
    poller: StatusPoller,
    trigger: ActionTrigger,
    threshold_pb: f64,
    /// Integrated luminosity at which this process last fired the action.
    /// Zero at start; the run-parameter cross-check covers restarts.
    last_trigger_lumi: f64,
}

impl DecisionEngine {
    pub fn new(poller: StatusPoller, trigger: ActionTrigger, threshold_pb: f64) -> Self {
        Self {
            poller,
            trigger,
            threshold_pb,
            last_trigger_lumi: 0.0,
        }
    }

    pub fn last_trigger_lumi(&self) -> f64 {
        self.last_trigger_lumi
    }

    /// Run one evaluation: walk the gates in order, fire on the terminal
    /// transition, otherwise leave all state untouched.
    pub async fn evaluate(&mut self) -> TickOutcome {
        let now = Utc::now().naive_utc();
        debug!("Time of execution: {}", now);

        // Gate 1: a usable, fresh snapshot.
        let Some(snapshot) = self.poller.fetch_snapshot().await else {
            return TickOutcome::Skipped(SkipReason::NoSnapshot);
        };
        debug!("WBM update time: {}", snapshot.collected_at);

        let age_secs = (now - snapshot.collected_at).num_milliseconds() as f64 / 1000.0;
        debug!("Snapshot age in seconds: {}", age_secs);
        if age_secs < -MAX_SNAPSHOT_LEAD_SECS || age_secs > MAX_SNAPSHOT_LAG_SECS {
            warn!(
                "PageZero time ahead of current time or lagging behind more than {} seconds, \
                 time difference in seconds: {}",
                MAX_SNAPSHOT_LAG_SECS, age_secs
            );
            return TickOutcome::Skipped(SkipReason::StaleSnapshot { age_secs });
        }

        // Gate 2: stable beams.
        let stable_beams = snapshot.stable_beams();
        debug!("Stable beams: {}", stable_beams);
        if !stable_beams {
            return TickOutcome::Skipped(SkipReason::BeamsNotStable);
        }

        // Gate 3: pixel detector included in the run.
        let pixel_in = snapshot.pixel_in_run();
        info!("Pixel in the run: {}", pixel_in);
        if !pixel_in {
            return TickOutcome::Skipped(SkipReason::PixelExcluded);
        }

        // Gate 4: supervisor running.
        let supervisor = self.poller.fetch_subsystem_state().await;
        info!("Pixel running: {}", supervisor == SupervisorState::Running);
        if supervisor != SupervisorState::Running {
            return TickOutcome::Skipped(SkipReason::SupervisorNotRunning);
        }

        // Gate 5: parseable run number and run luminosity.
        let (run_number, lumi_run) = match (
            snapshot.run_number.trim().parse::<u32>(),
            wbm::parse_lumi(&snapshot.lumi_run),
        ) {
            (Ok(run_number), Some(lumi_run)) => (run_number, lumi_run),
            _ => {
                warn!(
                    "Luminosity or run number for current run not available: {:?} - {:?}",
                    snapshot.lumi_run, snapshot.run_number
                );
                return TickOutcome::Skipped(SkipReason::UnparseableRunData);
            }
        };
        info!("Luminosity for current run {} is: {} pb-1", run_number, lumi_run);

        // Gate 6: relative threshold.
        let passed_pb = lumi_run - self.last_trigger_lumi;
        if passed_pb <= self.threshold_pb {
            let remaining_pb = self.threshold_pb - passed_pb;
            info!(
                "Threshold for soft-error detection not yet reached, only {} pb-1 \
                 (relative, total {} pb-1) have passed, {} pb-1 remaining",
                passed_pb, lumi_run, remaining_pb
            );
            return TickOutcome::Skipped(SkipReason::BelowThreshold {
                passed_pb,
                remaining_pb,
            });
        }

        // Gate 7: nonzero instantaneous rate, needed for the elapsed
        // estimate in the cross-check.
        let instant_lumi = wbm::parse_lumi(&snapshot.instant_lumi).unwrap_or(0.0);
        debug!("Instantaneous luminosity [1e30 cm-2 s-1]: {}", instant_lumi);
        if instant_lumi == 0.0 {
            return TickOutcome::Skipped(SkipReason::ZeroInstantLumi);
        }

        info!(
            "General threshold for soft-error detection reached, {} pb-1 have passed",
            passed_pb
        );

        // Gate 8: cross-check against the remote record, so a restart or a
        // second instance cannot double-fire within one budget.
        let history = match self
            .poller
            .fetch_historical_trigger(run_number, now, instant_lumi)
            .await
        {
            Some(history) => history,
            None => return TickOutcome::Skipped(SkipReason::HistoryUnavailable),
        };

        match history {
            HistoricalTrigger::NotFound => {
                info!(
                    "Soft-error detection does not seem to have been triggered for run {}",
                    run_number
                );
            }
            HistoricalTrigger::SincePb(since_pb) if since_pb >= self.threshold_pb => {
                info!(
                    "Threshold reached since last remote detection, {} pb-1 have passed",
                    since_pb
                );
            }
            HistoricalTrigger::SincePb(since_pb) => {
                info!(
                    "Threshold has not been reached since last remote detection, \
                     only {} pb-1 have passed",
                    since_pb
                );
                return TickOutcome::Skipped(SkipReason::RecentRemoteTrigger { since_pb });
            }
        }

        // Terminal transition: fire and move the baseline. The baseline
        // moves even when the call fails; delivery is not guaranteed.
        info!("Triggering soft-error detection mechanism in run {}", run_number);
        self.trigger.fire(run_number).await;
        self.last_trigger_lumi = lumi_run;

        TickOutcome::Triggered { run_number, lumi_run }
    }
}

impl Tick for DecisionEngine {
    async fn tick(&mut self) {
        let outcome = self.evaluate().await;
        debug!("Tick outcome: {:?}", outcome);
    }
}
