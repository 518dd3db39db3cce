//! Per-thread, per-replication mutable state.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use qs_core::{Expression, SimTime, StationId};
use qs_entity::{ClientPool, client_ceiling};
use qs_output::WriterRegistry;
use qs_resource::ResourceSet;
use qs_stats::{IndicatorCache, IndicatorHandle};
use qs_transport::TransporterSystem;
use rustc_hash::FxHashMap;

use crate::model::RunModel;

// ── Thread setup ──────────────────────────────────────────────────────────────

/// Source of arrival packages shared by all threads of one run.
pub trait ArrivalPackages: Send + Sync + fmt::Debug {
    /// The next package of arrivals; 0 once all are handed out.
    fn take_arrivals(&self) -> u64;
}

/// How replications and arrivals are divided between threads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThreadSplit {
    /// Replications run by this thread.
    pub sim_days:              u64,
    /// Replications run by threads with a lower number.
    pub days_by_other_threads: u64,
    /// Divisor applied to the arrival count and the warm-up arrivals.
    pub client_count_div:      u64,
}

impl ThreadSplit {
    pub const SINGLE: ThreadSplit = ThreadSplit { sim_days: 1, days_by_other_threads: 0, client_count_div: 1 };
}

/// Everything a worker thread needs besides the model.
#[derive(Clone, Debug)]
pub struct ThreadSetup {
    pub thread_nr:      usize,
    pub thread_count:   usize,
    pub split:          ThreadSplit,
    /// Global seed; the thread stream is derived from it.
    pub seed:           u64,
    pub animation:      bool,
    pub dispose_at_end: bool,
    pub balancer:       Option<Arc<dyn ArrivalPackages>>,
}

impl ThreadSetup {
    /// One thread doing everything.
    pub fn single(seed: u64) -> Self {
        Self {
            thread_nr:      0,
            thread_count:   1,
            split:          ThreadSplit::SINGLE,
            seed,
            animation:      false,
            dispose_at_end: false,
            balancer:       None,
        }
    }
}

// ── Listeners ─────────────────────────────────────────────────────────────────

/// Listener lists that support removal while a round is running.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListenerKind {
    StateChange,
    ClientMove,
    TransporterMove,
}

#[derive(Clone, Debug)]
pub(crate) struct FreeResourcesListener {
    pub station:  StationId,
    pub priority: Arc<dyn Expression>,
    /// Cached value of a constant priority.
    pub constant: Option<f64>,
}

/// Station ids per notification round, built by one scan of the station
/// table.  Rounds iterate over a cheap `Arc` clone, so stations may remove
/// themselves; removals are applied after the round.
#[derive(Clone, Debug, Default)]
pub(crate) struct Listeners {
    pub state_change:         Arc<[StationId]>,
    pub client_move:          Arc<[StationId]>,
    pub transporter_move:     Arc<[StationId]>,
    pub signal:               Arc<[StationId]>,
    pub transporter_position: Arc<[StationId]>,
    pub free_resources:       Arc<[FreeResourcesListener]>,

    pub remove_state_change:     Vec<StationId>,
    pub remove_client_move:      Vec<StationId>,
    pub remove_transporter_move: Vec<StationId>,
}

impl Listeners {
    pub fn scan(model: &RunModel) -> Self {
        let mut state_change = Vec::new();
        let mut client_move = Vec::new();
        let mut transporter_move = Vec::new();
        let mut signal = Vec::new();
        let mut transporter_position = Vec::new();
        let mut free_resources = Vec::new();

        for (i, station) in model.stations.iter().enumerate() {
            let id = StationId(i as u32);
            let interests = station.interests();
            if interests.state_change {
                state_change.push(id);
            }
            if interests.client_move {
                client_move.push(id);
            }
            if interests.transporter_move {
                transporter_move.push(id);
            }
            if interests.signal {
                signal.push(id);
            }
            if interests.transporter_position {
                transporter_position.push(id);
            }
            if let Some(priority) = station.resource_priority() {
                let constant = priority.constant_value();
                free_resources.push(FreeResourcesListener { station: id, priority, constant });
            }
        }

        Self {
            state_change:            state_change.into(),
            client_move:             client_move.into(),
            transporter_move:        transporter_move.into(),
            signal:                  signal.into(),
            transporter_position:    transporter_position.into(),
            free_resources:          free_resources.into(),
            remove_state_change:     Vec::new(),
            remove_client_move:      Vec::new(),
            remove_transporter_move: Vec::new(),
        }
    }

    pub fn mark_removed(&mut self, kind: ListenerKind, station: StationId) {
        match kind {
            ListenerKind::StateChange => self.remove_state_change.push(station),
            ListenerKind::ClientMove => self.remove_client_move.push(station),
            ListenerKind::TransporterMove => self.remove_transporter_move.push(station),
        }
    }

    /// Apply the removals collected during a round.
    pub fn apply_removals(&mut self) {
        fn apply(list: &mut Arc<[StationId]>, removed: &mut Vec<StationId>) {
            if removed.is_empty() {
                return;
            }
            *list = list.iter().copied().filter(|id| !removed.contains(id)).collect();
            removed.clear();
        }
        apply(&mut self.state_change, &mut self.remove_state_change);
        apply(&mut self.client_move, &mut self.remove_client_move);
        apply(&mut self.transporter_move, &mut self.remove_transporter_move);
    }
}

// ── RunData ───────────────────────────────────────────────────────────────────

pub struct RunData {
    pub resources:    ResourceSet,
    pub transporters: TransporterSystem,
    pub clients:      ClientPool,
    /// Model variables followed by the client slots (waiting, transfer,
    /// process seconds).
    pub variables:    Vec<f64>,
    pub warm_up:      bool,
    pub stopped:      bool,
    /// Arrivals counted by the sources; reset when the warm-up ends.
    pub arrivals:     u64,
    pub writers:      WriterRegistry,

    arrivals_to_simulate: Option<u64>,
    package:              i64,
    station_state:        Vec<Option<Box<dyn Any>>>,

    pub(crate) listeners:         Option<Listeners>,
    pub(crate) station_clients:   IndicatorCache,
    pub(crate) station_counts:    Vec<u32>,
    pub(crate) transitions:       FxHashMap<(StationId, StationId), IndicatorHandle>,
    pub(crate) timed_checks:      Vec<StationId>,
    pub(crate) timed_checks_on:   bool,
    /// Queued schedule rechecks; they alone do not keep a run going.
    pub(crate) recheck_events:    usize,
    pub(crate) last_state_change: Option<SimTime>,
    pub(crate) last_triggered:    Option<SimTime>,
}

impl fmt::Debug for RunData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunData")
            .field("resources", &self.resources.len())
            .field("transporters", &self.transporters.len())
            .field("live_clients", &self.clients.live())
            .field("warm_up", &self.warm_up)
            .field("stopped", &self.stopped)
            .field("arrivals", &self.arrivals)
            .finish_non_exhaustive()
    }
}

impl RunData {
    /// Thread-local copies of the model's templates.
    pub fn new(model: &RunModel, setup: &ThreadSetup) -> Self {
        let ceiling = client_ceiling(setup.thread_count, setup.animation, model.client_ceiling);
        let station_count = model.stations.len();
        Self {
            resources: ResourceSet::from_templates(&model.resources, model.secondary_priority),
            transporters: TransporterSystem::from_templates(&model.transporters),
            clients: ClientPool::new(
                Arc::clone(&model.client_types),
                Arc::clone(&model.station_names),
                model.recording.clients(),
                ceiling,
            ),
            variables: vec![0.0; model.variable_slots()],
            warm_up: model.warm_up.is_active(),
            stopped: false,
            arrivals: 0,
            writers: WriterRegistry::new(),
            arrivals_to_simulate: None,
            package: 0,
            station_state: (0..station_count).map(|_| None).collect(),
            listeners: None,
            station_clients: IndicatorCache::new(),
            station_counts: vec![0; station_count],
            transitions: FxHashMap::default(),
            timed_checks: Vec::new(),
            timed_checks_on: false,
            recheck_events: 0,
            last_state_change: None,
            last_triggered: None,
        }
    }

    /// Listener lists, scanned from the model on first use.
    pub(crate) fn listeners(&mut self, model: &RunModel) -> &mut Listeners {
        self.listeners.get_or_insert_with(|| Listeners::scan(model))
    }

    // ── Station state arena ───────────────────────────────────────────────

    /// The state of `station` if it is a `T`.
    pub fn state<T: Any>(&self, station: StationId) -> Option<&T> {
        self.station_state.get(station.index())?.as_ref()?.downcast_ref::<T>()
    }

    pub fn state_mut<T: Any>(&mut self, station: StationId) -> Option<&mut T> {
        self.station_state.get_mut(station.index())?.as_mut()?.downcast_mut::<T>()
    }

    /// Run `f` on the state of `station`, creating it with `init` if it is
    /// missing or of another type.
    pub fn with_state<T: Any, R>(
        &mut self,
        station: StationId,
        init:    impl FnOnce() -> T,
        f:       impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut state = self.take_state(station).unwrap_or_else(|| Box::new(init()));
        let result = f(&mut *state);
        self.put_state(station, state);
        result
    }

    /// Remove the state of `station` if it is a `T`.  A state of another
    /// type stays in place.
    pub fn take_state<T: Any>(&mut self, station: StationId) -> Option<Box<T>> {
        let slot = self.station_state.get_mut(station.index())?;
        match slot.take()?.downcast::<T>() {
            Ok(state) => Some(state),
            Err(other) => {
                *slot = Some(other);
                None
            }
        }
    }

    pub fn put_state<T: Any>(&mut self, station: StationId, state: Box<T>) {
        let i = station.index();
        if self.station_state.len() <= i {
            self.station_state.resize_with(i + 1, || None);
        }
        self.station_state[i] = Some(state);
    }

    // ── Arrival accounting ────────────────────────────────────────────────

    /// `true` if the client that just arrived is the last one this thread
    /// generates.  Call once per arrival, after counting it.
    pub fn next_client_is_last(&mut self, model: &RunModel, setup: &ThreadSetup) -> bool {
        if self.warm_up || model.termination.client_count == 0 {
            return false;
        }
        match &setup.balancer {
            None => {
                let share = *self.arrivals_to_simulate.get_or_insert_with(|| {
                    let total = model.termination.client_count;
                    let div = setup.split.client_count_div.max(1);
                    let last_thread = setup.thread_count > 1 && setup.thread_nr == setup.thread_count - 1;
                    total / div + if last_thread { total % div } else { 0 }
                });
                self.arrivals >= share
            }
            Some(balancer) => {
                if self.package <= 0 {
                    self.package = i64::try_from(balancer.take_arrivals()).unwrap_or(i64::MAX);
                }
                self.package -= 1;
                self.package < 0
            }
        }
    }

    /// Clients currently at `station`, as counted by the station-clients
    /// indicators.
    pub fn station_count(&self, station: StationId) -> u32 {
        self.station_counts.get(station.index()).copied().unwrap_or(0)
    }
}
