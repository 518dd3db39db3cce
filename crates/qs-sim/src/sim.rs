//! The `Simulator`: one worker per thread, then one merged result.

use std::sync::Arc;
use std::time::Instant;

use qs_core::SimConfig;
use qs_run::{ArrivalPackages, RunModel, SimulationData, ThreadSetup, ThreadSplit};
use qs_stats::Statistics;
use tracing::{debug, info, warn};

use crate::balancer::{DynamicLoadBalancer, balance_info};
use crate::observer::DayReport;
use crate::{SimError, SimObserver, SimResult};

// ── Worker ────────────────────────────────────────────────────────────────────

/// What a worker thread hands back when it is done.
struct WorkerOutput {
    stats:   Statistics,
    reports: Vec<DayReport>,
}

/// Run the replications of one thread.  A replication that ends with an
/// emergency shutdown ends the thread's work.
fn run_worker(model: Arc<RunModel>, setup: ThreadSetup) -> WorkerOutput {
    let thread_nr = setup.thread_nr;
    let mut sim = SimulationData::new(model, setup);
    let mut reports = Vec::new();

    for day in 0..sim.sim_days() {
        let arrivals_before = sim.stats.arrivals;
        sim.run_day(day);
        let report = DayReport {
            thread_nr,
            day:       sim.global_day(),
            arrivals:  sim.stats.arrivals - arrivals_before,
            events:    sim.queue.executed(),
            end:       sim.now(),
            run_error: sim.stats.run_error,
        };
        reports.push(report);
        if report.run_error {
            debug!(thread = thread_nr, day = report.day, "remaining replications skipped");
            break;
        }
    }

    WorkerOutput { stats: sim.into_statistics(), reports }
}

#[cfg(not(feature = "parallel"))]
fn run_workers(model: &Arc<RunModel>, setups: Vec<ThreadSetup>) -> Vec<SimResult<WorkerOutput>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = setups
            .into_iter()
            .map(|setup| {
                let nr = setup.thread_nr;
                let model = Arc::clone(model);
                (nr, scope.spawn(move || run_worker(model, setup)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(nr, handle)| handle.join().map_err(|_| SimError::ThreadPanicked(nr)))
            .collect()
    })
}

#[cfg(feature = "parallel")]
fn run_workers(model: &Arc<RunModel>, setups: Vec<ThreadSetup>) -> Vec<SimResult<WorkerOutput>> {
    use rayon::prelude::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    setups
        .into_par_iter()
        .map(|setup| {
            let nr = setup.thread_nr;
            let model = Arc::clone(model);
            catch_unwind(AssertUnwindSafe(|| run_worker(model, setup))).map_err(|_| SimError::ThreadPanicked(nr))
        })
        .collect()
}

// ── Simulator ─────────────────────────────────────────────────────────────────

/// Runs a model on several threads and merges their statistics.
///
/// Create via [`SimBuilder`][crate::SimBuilder].  A simulator can be run
/// more than once; every run starts from scratch with the same seed.
#[derive(Debug)]
pub struct Simulator {
    config: SimConfig,
    model:  Arc<RunModel>,
    /// Work of every thread, indexed by thread number.
    splits: Vec<ThreadSplit>,
}

impl Simulator {
    pub(crate) fn new(config: SimConfig, model: Arc<RunModel>, splits: Vec<ThreadSplit>) -> Self {
        Self { config, model, splits }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<RunModel> {
        &self.model
    }

    pub fn thread_count(&self) -> usize {
        self.splits.len()
    }

    pub fn splits(&self) -> &[ThreadSplit] {
        &self.splits
    }

    /// Arrivals are handed out in packages instead of fixed shares: only
    /// for a single replication bounded by a client count on several
    /// threads.
    pub fn uses_balancer(&self) -> bool {
        self.config.dynamic_load_balance
            && self.model.repeat_count == 1
            && self.thread_count() > 1
            && self.model.termination.client_count > 0
    }

    /// Run every replication and return the merged statistics.
    ///
    /// An emergency shutdown inside a replication does not make this fail;
    /// check [`Statistics::run_error`] instead.  Errors are reserved for
    /// worker threads that panicked.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<Statistics> {
        let started = Instant::now();
        let threads = self.thread_count();
        let balancer = self
            .uses_balancer()
            .then(|| Arc::new(DynamicLoadBalancer::new(self.model.termination.client_count, threads)));

        info!(
            threads,
            repeat_count = self.model.repeat_count,
            balancer = balancer.is_some(),
            seed = self.config.seed,
            "simulation starts"
        );
        observer.on_sim_start(threads);

        let setups = self
            .splits
            .iter()
            .enumerate()
            .map(|(thread_nr, &split)| ThreadSetup {
                thread_nr,
                thread_count: threads,
                split,
                seed: self.config.seed,
                animation: self.config.animation,
                dispose_at_end: self.config.dispose_at_end,
                balancer: balancer.clone().map(|b| b as Arc<dyn ArrivalPackages>),
            })
            .collect();

        let outputs = run_workers(&self.model, setups).into_iter().collect::<SimResult<Vec<_>>>()?;

        for output in &outputs {
            for report in &output.reports {
                observer.on_day_done(report);
            }
        }

        let per_thread: Vec<u64> = outputs.iter().map(|o| o.stats.arrivals).collect();
        let events: u64 = outputs.iter().flat_map(|o| &o.reports).map(|r| r.events).sum();
        let mut outputs = outputs.into_iter();
        let mut stats = match outputs.next() {
            Some(first) => first.stats,
            None => Statistics::new(self.model.batch_size),
        };
        for output in outputs {
            stats.merge(&output.stats);
        }
        stats.threads = threads;
        stats.repeat_count = self.model.repeat_count;

        if let Some(balancer) = &balancer {
            stats.thread_balance = balance_info(&per_thread);
            info!(
                handed_out = balancer.handed_out(),
                total = balancer.total(),
                spread = stats.thread_balance,
                "arrival packages"
            );
        }
        if stats.run_error {
            warn!(message = stats.error_message.as_deref().unwrap_or(""), "simulation ended with an error");
        }
        info!(
            arrivals = stats.arrivals,
            events,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation done"
        );

        observer.on_sim_end(&stats);
        Ok(stats)
    }
}
