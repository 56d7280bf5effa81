//! Periodic reaping as a background task.
//!
//! Every `reap_interval` the reaper runs one pass over the factory, prints
//! what was evicted and learned, and dumps the inventory. A pass that has
//! started always runs to completion; shutdown is only observed between
//! passes.

use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::event_display::{display_inventory, display_reap_report};
use crate::clock::KernelClock;
use crate::connections::{Classification, Factory, ReapReport};

/// Default time between reap passes
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);

pub struct Reaper {
    factory: Arc<Factory>,
    reap_interval: Duration,
    clock: KernelClock,
    quiet: bool,
}

impl Reaper {
    #[must_use]
    pub fn new(
        factory: Arc<Factory>,
        reap_interval: Duration,
        clock: KernelClock,
        quiet: bool,
    ) -> Self {
        Self {
            factory,
            reap_interval,
            clock,
            quiet,
        }
    }

    /// Run passes until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Reaping every {}s", self.reap_interval.as_secs());

        let mut ticker = interval_at(Instant::now() + self.reap_interval, self.reap_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reaper stopped");
    }

    /// One pass: reap, report, dump the inventory
    pub fn reap_once(&self) -> ReapReport {
        let report = self.factory.reap();

        info!(
            "Reap pass: {} complete, {} malformed, {} stale, {} still open, {} new API entries",
            report.count(Classification::Complete),
            report.count(Classification::Malformed),
            report.count(Classification::Stale),
            report.still_open,
            report.new_entries.len(),
        );

        if !self.quiet {
            display_reap_report(&report, &self.clock);
            display_inventory(&self.factory.inventory());
        }
        report
    }
}
