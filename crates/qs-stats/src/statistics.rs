//! The statistics of one simulation run.
//!
//! A worker thread owns one `Statistics` for all its replications.  At the
//! end of the run the per-thread objects are merged into one result.

use qs_core::SimTime;

use crate::indicator::{CountIndicator, DataIndicator, Indicator, TimeIndicator, ValueIndicator};
use crate::registry::Registry;

/// Batch means are off unless the model sets a batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 0;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    // ── Clients ───────────────────────────────────────────────────────────
    pub clients_in_system:         TimeIndicator,
    pub clients_in_system_by_type: Registry<TimeIndicator>,
    pub waiting_all:               DataIndicator,
    pub transfer_all:              DataIndicator,
    pub process_all:               DataIndicator,
    pub residence_all:             DataIndicator,
    pub client_waiting:            Registry<DataIndicator>,
    pub client_transfer:           Registry<DataIndicator>,
    pub client_process:            Registry<DataIndicator>,
    pub client_residence:          Registry<DataIndicator>,
    pub client_costs_waiting:      Registry<ValueIndicator>,
    pub client_costs_transfer:     Registry<ValueIndicator>,
    pub client_costs_process:      Registry<ValueIndicator>,
    /// Time between two departures of the same client type.
    pub client_leave_inter:        Registry<DataIndicator>,
    /// Numeric user data, keyed by the decimal index.
    pub client_data:               Registry<DataIndicator>,
    pub client_paths:              Registry<CountIndicator>,
    pub station_transitions:       Registry<CountIndicator>,

    // ── Stations ──────────────────────────────────────────────────────────
    pub station_waiting:   Registry<DataIndicator>,
    pub station_transfer:  Registry<DataIndicator>,
    pub station_process:   Registry<DataIndicator>,
    pub station_residence: Registry<DataIndicator>,
    pub station_clients:   Registry<TimeIndicator>,

    // ── Resources ─────────────────────────────────────────────────────────
    pub resource_count:         Registry<TimeIndicator>,
    pub resource_usage:         Registry<TimeIndicator>,
    pub resource_down_time:     Registry<TimeIndicator>,
    pub resource_usage_all:     TimeIndicator,
    pub resource_costs_active:  Registry<ValueIndicator>,
    pub resource_costs_process: Registry<ValueIndicator>,
    pub resource_costs_idle:    Registry<ValueIndicator>,

    // ── Transporters ──────────────────────────────────────────────────────
    pub transporter_usage:     Registry<TimeIndicator>,
    pub transporter_down_time: Registry<TimeIndicator>,

    // ── Run information ───────────────────────────────────────────────────
    /// Clients created by the sources, excluding warm-up arrivals.
    pub arrivals:      u64,
    /// Finished replications.
    pub repeat_count:  u64,
    pub threads:       usize,
    /// Spread of arrivals across threads, `(max - min) * threads / sum`.
    pub thread_balance: f64,
    pub run_error:     bool,
    pub error_message: Option<String>,
    pub warnings:      Vec<String>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Statistics {
    /// `batch_size` configures batch means on the waiting-time indicators.
    pub fn new(batch_size: u32) -> Self {
        let data = || Registry::with_template(DataIndicator::new(batch_size));
        Self {
            clients_in_system:         TimeIndicator::new(),
            clients_in_system_by_type: Registry::default(),
            waiting_all:               DataIndicator::new(batch_size),
            transfer_all:              DataIndicator::new(batch_size),
            process_all:               DataIndicator::new(batch_size),
            residence_all:             DataIndicator::new(batch_size),
            client_waiting:            data(),
            client_transfer:           data(),
            client_process:            data(),
            client_residence:          data(),
            client_costs_waiting:      Registry::default(),
            client_costs_transfer:     Registry::default(),
            client_costs_process:      Registry::default(),
            client_leave_inter:        Registry::default(),
            client_data:               Registry::default(),
            client_paths:              Registry::default(),
            station_transitions:       Registry::default(),
            station_waiting:           data(),
            station_transfer:          data(),
            station_process:           data(),
            station_residence:         data(),
            station_clients:           Registry::default(),
            resource_count:            Registry::default(),
            resource_usage:            Registry::default(),
            resource_down_time:        Registry::default(),
            resource_usage_all:        TimeIndicator::new(),
            resource_costs_active:     Registry::default(),
            resource_costs_process:    Registry::default(),
            resource_costs_idle:       Registry::default(),
            transporter_usage:         Registry::default(),
            transporter_down_time:     Registry::default(),
            arrivals:                  0,
            repeat_count:              0,
            threads:                   1,
            thread_balance:            0.0,
            run_error:                 false,
            error_message:             None,
            warnings:                  Vec::new(),
        }
    }

    fn time_indicators_mut(&mut self) -> impl Iterator<Item = &mut TimeIndicator> {
        std::iter::once(&mut self.clients_in_system)
            .chain(std::iter::once(&mut self.resource_usage_all))
            .chain(self.clients_in_system_by_type.values_mut())
            .chain(self.station_clients.values_mut())
            .chain(self.resource_count.values_mut())
            .chain(self.resource_usage.values_mut())
            .chain(self.resource_down_time.values_mut())
            .chain(self.transporter_usage.values_mut())
            .chain(self.transporter_down_time.values_mut())
    }

    fn data_indicators_mut(&mut self) -> impl Iterator<Item = &mut DataIndicator> {
        [&mut self.waiting_all, &mut self.transfer_all, &mut self.process_all, &mut self.residence_all]
            .into_iter()
            .chain(self.client_waiting.values_mut())
            .chain(self.client_transfer.values_mut())
            .chain(self.client_process.values_mut())
            .chain(self.client_residence.values_mut())
            .chain(self.client_leave_inter.values_mut())
            .chain(self.client_data.values_mut())
            .chain(self.station_waiting.values_mut())
            .chain(self.station_transfer.values_mut())
            .chain(self.station_process.values_mut())
            .chain(self.station_residence.values_mut())
    }

    fn value_indicators_mut(&mut self) -> impl Iterator<Item = &mut ValueIndicator> {
        self.client_costs_waiting
            .values_mut()
            .chain(self.client_costs_transfer.values_mut())
            .chain(self.client_costs_process.values_mut())
            .chain(self.resource_costs_active.values_mut())
            .chain(self.resource_costs_process.values_mut())
            .chain(self.resource_costs_idle.values_mut())
    }

    /// Discard everything recorded so far.  Time indicators keep their
    /// current state and restart at `now`.  Used at the end of the warm-up.
    pub fn reset_at(&mut self, now: SimTime) {
        let t = now.as_secs_f64();
        self.time_indicators_mut().for_each(|i| i.restart_at(t));
        self.data_indicators_mut().for_each(Indicator::reset);
        self.value_indicators_mut().for_each(Indicator::reset);
        self.client_paths.reset_all();
        self.station_transitions.reset_all();
        self.arrivals = 0;
    }

    /// Credit the time up to `now` to every time indicator's current state.
    pub fn close_time_indicators(&mut self, now: SimTime) {
        let t = now.as_secs_f64();
        self.time_indicators_mut().for_each(|i| i.close(t));
    }

    /// Close one replication on every indicator.
    pub fn finish_run(&mut self) {
        self.time_indicators_mut().for_each(Indicator::finish_run);
        self.data_indicators_mut().for_each(Indicator::finish_run);
        self.repeat_count += 1;
    }

    /// Add the data of `other` (another thread or replication).
    pub fn merge(&mut self, other: &Statistics) {
        self.clients_in_system.merge(&other.clients_in_system);
        self.clients_in_system_by_type.merge(&other.clients_in_system_by_type);
        self.waiting_all.merge(&other.waiting_all);
        self.transfer_all.merge(&other.transfer_all);
        self.process_all.merge(&other.process_all);
        self.residence_all.merge(&other.residence_all);
        self.client_waiting.merge(&other.client_waiting);
        self.client_transfer.merge(&other.client_transfer);
        self.client_process.merge(&other.client_process);
        self.client_residence.merge(&other.client_residence);
        self.client_costs_waiting.merge(&other.client_costs_waiting);
        self.client_costs_transfer.merge(&other.client_costs_transfer);
        self.client_costs_process.merge(&other.client_costs_process);
        self.client_leave_inter.merge(&other.client_leave_inter);
        self.client_data.merge(&other.client_data);
        self.client_paths.merge(&other.client_paths);
        self.station_transitions.merge(&other.station_transitions);
        self.station_waiting.merge(&other.station_waiting);
        self.station_transfer.merge(&other.station_transfer);
        self.station_process.merge(&other.station_process);
        self.station_residence.merge(&other.station_residence);
        self.station_clients.merge(&other.station_clients);
        self.resource_count.merge(&other.resource_count);
        self.resource_usage.merge(&other.resource_usage);
        self.resource_down_time.merge(&other.resource_down_time);
        self.resource_usage_all.merge(&other.resource_usage_all);
        self.resource_costs_active.merge(&other.resource_costs_active);
        self.resource_costs_process.merge(&other.resource_costs_process);
        self.resource_costs_idle.merge(&other.resource_costs_idle);
        self.transporter_usage.merge(&other.transporter_usage);
        self.transporter_down_time.merge(&other.transporter_down_time);

        self.arrivals += other.arrivals;
        self.repeat_count += other.repeat_count;
        if other.run_error {
            self.run_error = true;
            if self.error_message.is_none() {
                self.error_message.clone_from(&other.error_message);
            }
        }
        self.warnings.extend(other.warnings.iter().cloned());
    }

    /// Mark the run as failed.  The first message is kept.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.run_error = true;
        if self.error_message.is_none() {
            self.error_message = Some(message.into());
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Batch-means half-width of all waiting times at level `1 - alpha`.
    pub fn waiting_half_width(&self, alpha: f64) -> f64 {
        self.waiting_all.batch_half_width(alpha)
    }

    /// Sum of all resource costs.
    pub fn resource_costs(&self) -> f64 {
        let sum = |r: &Registry<ValueIndicator>| r.iter().map(|(_, v)| v.value()).sum::<f64>();
        sum(&self.resource_costs_active)
            + sum(&self.resource_costs_process)
            + sum(&self.resource_costs_idle)
    }

    /// Sum of all client costs.
    pub fn client_costs(&self) -> f64 {
        let sum = |r: &Registry<ValueIndicator>| r.iter().map(|(_, v)| v.value()).sum::<f64>();
        sum(&self.client_costs_waiting)
            + sum(&self.client_costs_transfer)
            + sum(&self.client_costs_process)
    }
}
