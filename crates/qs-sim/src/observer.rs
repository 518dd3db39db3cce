//! Simulation observer trait for progress reporting.

use qs_core::SimTime;
use qs_stats::Statistics;

/// What one worker thread reports about a finished replication.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DayReport {
    pub thread_nr: usize,
    /// Global replication number.
    pub day:       u64,
    /// Arrivals counted for the statistics during this replication.
    pub arrivals:  u64,
    /// Events executed.
    pub events:    u64,
    /// Model time when the replication ended.
    pub end:       SimTime,
    /// The replication ended with an emergency shutdown.
    pub run_error: bool,
}

/// Callbacks invoked by [`Simulator::run`][crate::Simulator::run].
///
/// Worker threads never call the observer themselves.  Replication reports
/// are delivered on the calling thread once the workers have joined,
/// ordered by thread and day.
///
/// All methods have default no-op implementations.
pub trait SimObserver {
    /// Called before the workers start.
    fn on_sim_start(&mut self, _threads: usize) {}

    fn on_day_done(&mut self, _report: &DayReport) {}

    /// Called once with the merged statistics.
    fn on_sim_end(&mut self, _stats: &Statistics) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
