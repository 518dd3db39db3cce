//! `EventQueue`: the per-thread future event list.
//!
//! Events are keyed by their model time in a `BTreeMap`.  Events at the same
//! time run in insertion order.  Scheduling into the past is clamped to the
//! current time, so time never runs backwards.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use qs_core::SimTime;
use qs_transport::TransporterRef;

use crate::sim_data::SimulationData;

/// Something that happens at one point in model time.
pub trait Event {
    fn run(self: Box<Self>, sim: &mut SimulationData);
}

/// An event backed by a closure.
pub struct FnEvent<F>(pub F);

impl<F> Event for FnEvent<F>
where
    F: FnOnce(&mut SimulationData),
{
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        (self.0)(sim)
    }
}

#[derive(Default)]
pub struct EventQueue {
    inner:    BTreeMap<SimTime, VecDeque<Box<dyn Event>>>,
    /// Cached total event count for O(1) `len()`.
    total:    usize,
    now:      SimTime,
    executed: u64,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("now", &self.now)
            .field("len", &self.total)
            .field("executed", &self.executed)
            .finish()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current model time: the time of the event being executed.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `event` at `at` (clamped to now).
    pub fn schedule(&mut self, at: SimTime, event: Box<dyn Event>) {
        let at = at.max(self.now);
        self.inner.entry(at).or_default().push_back(event);
        self.total += 1;
    }

    /// Schedule a closure at `at`.
    pub fn schedule_fn<F>(&mut self, at: SimTime, f: F)
    where
        F: FnOnce(&mut SimulationData) + 'static,
    {
        self.schedule(at, Box::new(FnEvent(f)));
    }

    /// Remove the earliest event and advance the clock to its time.
    pub fn pop(&mut self) -> Option<(SimTime, Box<dyn Event>)> {
        let mut entry = self.inner.first_entry()?;
        let at = *entry.key();
        let event = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        let event = event?;
        self.total -= 1;
        self.now = at;
        self.executed += 1;
        Some((at, event))
    }

    /// Time of the earliest queued event.
    pub fn next_time(&self) -> Option<SimTime> {
        self.inner.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Drop every queued event.  The clock stays where it is.
    pub fn cancel_all(&mut self) {
        self.inner.clear();
        self.total = 0;
    }

    /// Empty queue at time zero, for the next replication.
    pub fn reset(&mut self) {
        self.cancel_all();
        self.now = SimTime::ZERO;
        self.executed = 0;
    }

    /// Events executed since the last reset.
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

// ── Runtime events ────────────────────────────────────────────────────────────

/// Follow-up state-change round one millisecond after a rate-limited one.
pub(crate) struct StateChangeEvent;

impl Event for StateChangeEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.fire_state_change_notify();
    }
}

/// A resource operator's pause ends.
pub(crate) struct ResourceStatusEvent;

impl Event for ResourceStatusEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.fire_released_resources_notify();
    }
}

/// A schedule slot boundary.  Repeats every `every_ms` while the run has
/// anything left to do.
pub(crate) struct ResourceRecheckEvent {
    pub every_ms: u64,
}

impl Event for ResourceRecheckEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.run_data.recheck_events = sim.run_data.recheck_events.saturating_sub(1);
        sim.fire_released_resources_notify();
        if self.every_ms > 0 && sim.has_pending_work() {
            let at = sim.now().offset(self.every_ms);
            sim.run_data.recheck_events += 1;
            sim.queue.schedule(at, self);
        }
    }
}

pub(crate) struct TransporterArrivalEvent {
    pub unit: TransporterRef,
}

impl Event for TransporterArrivalEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.transporter_arrived(self.unit);
    }
}

pub(crate) struct TransporterPauseCheckEvent {
    pub unit: TransporterRef,
}

impl Event for TransporterPauseCheckEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.transporter_pause_check(self.unit);
    }
}

pub(crate) struct TransporterPauseEndEvent {
    pub unit: TransporterRef,
}

impl Event for TransporterPauseEndEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.transporter_pause_end(self.unit);
    }
}

pub(crate) struct TimedCheckEvent;

impl Event for TimedCheckEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.run_timed_checks();
    }
}

pub(crate) struct WarmUpEndEvent;

impl Event for WarmUpEndEvent {
    fn run(self: Box<Self>, sim: &mut SimulationData) {
        sim.end_warm_up();
    }
}
