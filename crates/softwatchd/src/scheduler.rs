//! Completion-gated repeating scheduler.
//!
//! One tick at a time: the wait for the next tick starts only after the
//! previous tick has completed, so a slow tick delays the next one and two
//! ticks can never overlap. Stopping cancels the pending wait, never an
//! in-flight tick.

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// One unit of repeatable work.
#[allow(async_fn_in_trait)]
pub trait Tick {
    async fn tick(&mut self);
}

pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Drive `worker` until `stop` turns true or its sender is dropped.
    ///
    /// The first tick starts immediately. The interval is measured from the
    /// completion of one tick to the start of the next.
    pub async fn run<T: Tick>(&self, worker: &mut T, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                break;
            }

            worker.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }
        debug!("scheduler stopped");
    }
}
