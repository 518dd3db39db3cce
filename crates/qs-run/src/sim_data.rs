//! `SimulationData`: everything one worker thread touches while it runs.
//!
//! The struct owns the event queue, the per-replication [`RunData`], the
//! thread's statistics and random stream.  Stations receive `&mut
//! SimulationData` in every hook and reach the subsystems through the
//! methods here (and the resource/transporter facade in `facade.rs`).
//!
//! # Replication lifecycle
//!
//! ```text
//! run_day(day)
//!   ├─ init_day       fresh RunData (day > 0), initial variables, operators,
//!   │                 transporters, Station::init, first state-change round
//!   ├─ run_events     pop events until the queue is empty or the run stops
//!   └─ terminate_cleanup
//!                     in-system counts, optional forced disposal, resource
//!                     statistics, close writers and indicators, merge days
//! ```

use std::path::Path;
use std::sync::Arc;

use qs_core::{
    CalcFailure, CalcOrigin, ClientTypeId, EvalCtx, Expression, SimRng, SimTime, StationId, TimeSource,
};
use qs_entity::Client;
use qs_stats::Statistics;
use tracing::{debug, error, info, warn};

use crate::event::{Event, EventQueue, WarmUpEndEvent};
use crate::model::{RunModel, WarmUp};
use crate::run_data::{RunData, ThreadSetup};

/// Build an [`EvalCtx`] from disjoint field borrows of a `SimulationData`,
/// leaving `run_data.resources`, `run_data.transporters` and `stats` free.
macro_rules! eval_ctx {
    ($sim:expr) => {
        qs_core::EvalCtx {
            now:         $sim.queue.now(),
            warm_up:     $sim.run_data.warm_up,
            rng:         &mut $sim.rng,
            variables:   &$sim.run_data.variables,
            calc_errors: &mut $sim.calc_errors,
        }
    };
}
pub(crate) use eval_ctx;

pub struct SimulationData {
    pub model:       Arc<RunModel>,
    pub run_data:    RunData,
    pub stats:       Statistics,
    pub queue:       EventQueue,
    pub rng:         SimRng,
    /// Calculation errors of the current event, drained after it.
    pub calc_errors: Vec<CalcFailure>,

    setup:            ThreadSetup,
    current_day:      u64,
    /// Statistics of the replications this thread finished before.
    last_days:        Option<Statistics>,
    calc_error_count: u64,
}

impl std::fmt::Debug for SimulationData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationData")
            .field("thread_nr", &self.setup.thread_nr)
            .field("day", &self.current_day)
            .field("queue", &self.queue)
            .field("run_data", &self.run_data)
            .finish_non_exhaustive()
    }
}

impl SimulationData {
    pub fn new(model: Arc<RunModel>, setup: ThreadSetup) -> Self {
        let run_data = RunData::new(&model, &setup);
        let stats = Statistics::new(model.batch_size);
        let rng = SimRng::for_thread(setup.seed, setup.thread_nr);
        Self {
            model,
            run_data,
            stats,
            queue: EventQueue::new(),
            rng,
            calc_errors: Vec::new(),
            setup,
            current_day: 0,
            last_days: None,
            calc_error_count: 0,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn setup(&self) -> &ThreadSetup {
        &self.setup
    }

    pub fn thread_nr(&self) -> usize {
        self.setup.thread_nr
    }

    /// Replications this thread runs.
    pub fn sim_days(&self) -> u64 {
        self.setup.split.sim_days
    }

    /// Global number of the current replication.
    pub fn global_day(&self) -> u64 {
        self.setup.split.days_by_other_threads + self.current_day
    }

    pub fn is_warm_up(&self) -> bool {
        self.run_data.warm_up
    }

    pub fn is_stopped(&self) -> bool {
        self.run_data.stopped
    }

    pub fn schedule(&mut self, at: SimTime, event: Box<dyn Event>) {
        self.queue.schedule(at, event);
    }

    /// Schedule `event` `delay_ms` from now.
    pub fn schedule_in(&mut self, delay_ms: u64, event: Box<dyn Event>) {
        let at = self.now().offset(delay_ms);
        self.queue.schedule(at, event);
    }

    /// `true` while clients are alive or events other than schedule
    /// rechecks are queued.
    pub fn has_pending_work(&self) -> bool {
        self.run_data.clients.live() > 0 || self.queue.len() > self.run_data.recheck_events
    }

    // ── Running ───────────────────────────────────────────────────────────

    /// Run every replication of this thread.
    pub fn run(&mut self) {
        for day in 0..self.sim_days() {
            self.run_day(day);
        }
    }

    /// Run one replication.
    pub fn run_day(&mut self, day: u64) {
        debug!(thread = self.setup.thread_nr, day = self.global_day(), "replication starts");
        self.init_day(day);
        self.run_events();
        self.terminate_cleanup();
        debug!(
            thread = self.setup.thread_nr,
            day = self.global_day(),
            events = self.queue.executed(),
            arrivals = self.stats.arrivals,
            end = %self.now(),
            "replication done"
        );
    }

    pub fn init_day(&mut self, day: u64) {
        self.current_day = day;
        if day > 0 {
            let finished = std::mem::replace(&mut self.stats, Statistics::new(self.model.batch_size));
            self.last_days = Some(finished);
            self.run_data = RunData::new(&self.model, &self.setup);
        }
        self.queue.reset();
        self.calc_errors.clear();

        let model = Arc::clone(&self.model);
        for (i, initial) in model.variable_initial.iter().enumerate() {
            if let Some(expr) = initial {
                let value = eval_ctx!(self).eval_or(expr.as_ref(), &CalcOrigin::Model, 0.0);
                self.run_data.variables[i] = value;
            }
        }

        let mut ctx = eval_ctx!(self);
        self.run_data.resources.prepare_operators(&mut ctx);
        self.run_data.transporters.prepare(&mut ctx);
        self.drain_checks();

        if let WarmUp::Time(at) = model.warm_up
            && self.run_data.warm_up
        {
            self.queue.schedule(at, Box::new(WarmUpEndEvent));
        }

        for (i, station) in model.stations.iter().enumerate() {
            station.init(StationId(i as u32), self);
        }

        // The initial round does not count for the once-per-millisecond limit.
        self.fire_state_change_notify();
        self.run_data.last_state_change = None;
        self.run_data.last_triggered = None;
        self.check_calc_errors();
    }

    /// Execute events until the queue is empty, the run was stopped or the
    /// next event lies past the termination time.
    pub fn run_events(&mut self) {
        let end = self.model.termination.time_secs.map(SimTime::from_secs_f64);
        while !self.run_data.stopped {
            if let (Some(end), Some(next)) = (end, self.queue.next_time())
                && next > end
            {
                info!(thread = self.setup.thread_nr, at = %end, "termination time reached");
                self.shutdown();
                break;
            }
            let Some((_, event)) = self.queue.pop() else {
                break;
            };
            event.run(self);
            self.check_calc_errors();
        }
    }

    pub fn terminate_cleanup(&mut self) {
        let now = self.now();
        let warm_up = self.run_data.warm_up;
        self.run_data.clients.finalize_clients_in_system(warm_up, now, &mut self.stats);

        if self.setup.dispose_at_end {
            let model = Arc::clone(&self.model);
            for (i, station) in model.stations.iter().enumerate() {
                for client in station.take_clients(StationId(i as u32), self) {
                    self.dispose_client(client);
                }
            }
        }

        let ctx = eval_ctx!(self);
        self.run_data.resources.record_statistics(&ctx, &mut self.stats);
        self.stats.close_time_indicators(now);

        self.run_data.writers.finish_all();
        if let Some(err) = self.run_data.writers.take_error() {
            warn!(thread = self.setup.thread_nr, error = %err, "output file could not be written");
            self.stats.add_warning(err.to_string());
        }

        self.stats.finish_run();
        if let Some(previous) = self.last_days.take() {
            self.stats.merge(&previous);
        }
    }

    /// The statistics of all replications run so far.
    pub fn into_statistics(self) -> Statistics {
        self.stats
    }

    // ── Arrivals / warm-up ────────────────────────────────────────────────

    /// Count one arrival at a source.  Ends an arrival-based warm-up and
    /// returns `true` if the arriving client is the last one to generate.
    pub fn register_arrival(&mut self) -> bool {
        self.run_data.arrivals += 1;
        if self.run_data.warm_up {
            if let WarmUp::Arrivals(n) = self.model.warm_up {
                let threshold = n / self.setup.split.client_count_div.max(1);
                if self.run_data.arrivals >= threshold {
                    self.end_warm_up();
                }
            }
        } else {
            self.stats.arrivals += 1;
        }
        let model = Arc::clone(&self.model);
        self.run_data.next_client_is_last(&model, &self.setup)
    }

    /// Leave the warm-up phase: discard everything recorded so far and
    /// restart the time indicators at the current time.
    pub fn end_warm_up(&mut self) {
        if !self.run_data.warm_up {
            return;
        }
        let now = self.now();
        self.run_data.warm_up = false;
        self.run_data.arrivals = 0;
        self.stats.reset_at(now);
        self.run_data.resources.restart_at(now);
        info!(thread = self.setup.thread_nr, at = %now, "warm-up phase ends");

        let model = Arc::clone(&self.model);
        for (i, station) in model.stations.iter().enumerate() {
            station.end_warm_up(StationId(i as u32), self);
        }
    }

    // ── Clients ───────────────────────────────────────────────────────────

    /// A fresh client of `client_type`.  Exceeding the client ceiling shuts
    /// the run down and yields `None`.
    pub fn acquire_client(&mut self, client_type: ClientTypeId) -> Option<Box<Client>> {
        let now = self.now();
        match self.run_data.clients.acquire(client_type, self.run_data.warm_up, now, &mut self.stats) {
            Ok(client) => Some(client),
            Err(err) => {
                self.emergency_shutdown(err.to_string());
                None
            }
        }
    }

    /// Send `client` from `from` to `to`.  Listeners see the move now; the
    /// target station receives the client in an event at the current time.
    pub fn move_client(&mut self, mut client: Box<Client>, from: StationId, to: StationId) {
        client.last_station = from;
        client.next_station = to;
        self.fire_client_move_notify(&mut client, false);
        if self.model.station(to).is_none() {
            self.emergency_shutdown(format!("client {} sent to unknown station {}", client.number, to.0));
            let now = self.now();
            self.run_data.clients.dispose_without_statistics(client, now, &mut self.stats);
            return;
        }
        let now = self.now();
        self.queue.schedule_fn(now, move |sim: &mut SimulationData| sim.deliver_client(client, to));
    }

    /// Hand `client` to station `to` right away.
    pub fn deliver_client(&mut self, client: Box<Client>, to: StationId) {
        let Some(station) = self.model.station(to).cloned() else {
            let now = self.now();
            self.run_data.clients.dispose_without_statistics(client, now, &mut self.stats);
            return;
        };
        station.arrival(to, self, client);
    }

    /// `client` leaves the model at `station`: the move to the exit is
    /// recorded, then the client is disposed with statistics.
    pub fn leave_system(&mut self, station: StationId, mut client: Box<Client>) {
        client.last_station = station;
        client.next_station = StationId::INVALID;
        self.fire_client_move_notify(&mut client, false);
        self.dispose_client(client);
    }

    /// Record `client`'s data and return it to the pool.  A batch is
    /// dissolved first and every member is disposed on its own; the empty
    /// container is not recorded.  Every 500th disposal tests the
    /// confidence termination rule.
    pub fn dispose_client(&mut self, mut client: Box<Client>) {
        let model = Arc::clone(&self.model);
        for entry in client.take_sections() {
            if let Some(station) = model.station(entry.section) {
                station.section_leave(entry.section, self, &client, &entry);
            }
        }

        match client.dissolve_batch() {
            Some(members) => {
                for member in members {
                    self.dispose_client(member);
                }
            }
            None => {
                if !self.run_data.warm_up && !client.is_warm_up && client.in_statistics {
                    let now = self.now();
                    self.run_data.clients.log_client_data(&client, now, &mut self.stats);
                }
            }
        }
        let now = self.now();
        self.run_data.clients.dispose_without_statistics(client, now, &mut self.stats);

        if self.run_data.clients.confidence_tick() {
            self.check_confidence();
        }
    }

    fn check_confidence(&mut self) {
        let Some(rule) = self.model.termination.confidence else {
            return;
        };
        if self.run_data.warm_up || self.stats.waiting_all.batch_count() < 2 {
            return;
        }
        let half_width = self.stats.waiting_half_width(rule.alpha);
        if half_width <= rule.half_width {
            info!(
                thread = self.setup.thread_nr,
                half_width,
                target = rule.half_width,
                "confidence level reached"
            );
            self.shutdown();
        }
    }

    /// Change the number of clients at `station` by `delta`.
    pub fn station_clients_changed(&mut self, station: StationId, delta: i32) {
        let i = station.index();
        let Some(count) = self.run_data.station_counts.get_mut(i) else {
            return;
        };
        *count = count.saturating_add_signed(delta);
        let count = *count;
        let t = self.now().as_secs_f64();
        let name = self.model.station_name(station);
        self.run_data
            .station_clients
            .get_mut(&mut self.stats.station_clients, i, name)
            .set(t, count);
    }

    /// Put `client`'s times (in seconds) into the client variable slots, or
    /// zero them for `None`.
    pub fn set_client_variable_values(&mut self, client: Option<&Client>) {
        let base = self.model.variable_names.len();
        let values = match client {
            Some(c) => [
                c.times.waiting_ms as f64 / 1_000.0,
                c.times.transfer_ms as f64 / 1_000.0,
                c.times.process_ms as f64 / 1_000.0,
            ],
            None => [0.0; 3],
        };
        if let Some(slots) = self.run_data.variables.get_mut(base..base + 3) {
            slots.copy_from_slice(&values);
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// Evaluate `expr`; a failure is reported and yields `default`.
    pub fn eval(&mut self, expr: &dyn Expression, origin: &CalcOrigin, default: f64) -> f64 {
        eval_ctx!(self).eval_or(expr, origin, default)
    }

    /// Sample a duration in seconds; a failure is reported and yields 0.
    pub fn sample_secs(&mut self, source: &TimeSource, origin: &CalcOrigin) -> f64 {
        eval_ctx!(self).sample_secs(source, origin)
    }

    /// A context for direct calls into the subsystems.
    pub fn eval_ctx(&mut self) -> EvalCtx<'_> {
        eval_ctx!(self)
    }

    /// Act on the calculation errors collected since the last call.
    pub fn check_calc_errors(&mut self) {
        if self.calc_errors.is_empty() {
            return;
        }
        let errors = std::mem::take(&mut self.calc_errors);
        if self.model.stop_on_calc_error {
            if let Some(first) = errors.first() {
                self.emergency_shutdown(first.to_string());
            }
            return;
        }
        for failure in &errors {
            self.calc_error_count += 1;
            if self.calc_error_count == 1 {
                warn!(thread = self.setup.thread_nr, %failure, "calculation error, default value used");
            } else {
                debug!(thread = self.setup.thread_nr, %failure, "calculation error");
            }
        }
    }

    // ── Stopping ──────────────────────────────────────────────────────────

    /// Abort the run: record the error, drop all events and stop.
    pub fn emergency_shutdown(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(
            thread = self.setup.thread_nr,
            day = self.global_day(),
            at = %self.now(),
            %message,
            "emergency shutdown"
        );
        self.stats.add_warning(message.clone());
        self.stats.record_error(message);
        self.shutdown();
    }

    /// Stop the run regularly.
    pub fn shutdown(&mut self) {
        self.queue.cancel_all();
        self.run_data.stopped = true;
    }

    // ── Output ────────────────────────────────────────────────────────────

    /// Append a record to the output file at `path`.  Warm-up records are
    /// dropped.  Returns `false` if nothing was written.
    pub fn write_output(&mut self, path: &Path, header: Option<&[&str]>, fields: &[String]) -> bool {
        if self.run_data.warm_up {
            return false;
        }
        self.run_data.writers.write(path, header, fields)
    }
}
