//! The `Station` trait: model nodes and notification targets.
//!
//! Stations are immutable and shared by all threads.  Everything a station
//! changes while the run progresses (queues, counters) lives in the
//! per-thread state arena of [`RunData`](crate::RunData), reached through
//! [`RunData::with_state`](crate::RunData::with_state).
//!
//! Every hook has a default no-op implementation.  A station opts into a
//! notification round by returning the matching flag from
//! [`Station::interests`] (or a priority from
//! [`Station::resource_priority`] for the released-resources round).

use std::fmt;
use std::sync::Arc;

use qs_core::{Expression, StationId};
use qs_entity::{Client, SectionEntry};
use qs_transport::TransporterRef;

use crate::sim_data::SimulationData;

/// Notification rounds a station listens to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Interests {
    pub state_change:         bool,
    pub client_move:          bool,
    pub transporter_move:     bool,
    pub signal:               bool,
    /// Asked when a transporter becomes free elsewhere.
    pub transporter_position: bool,
}

impl Interests {
    pub const NONE: Interests = Interests {
        state_change:         false,
        client_move:          false,
        transporter_move:     false,
        signal:               false,
        transporter_position: false,
    };
}

pub trait Station: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn interests(&self) -> Interests {
        Interests::NONE
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Called once per replication before the first event.  Sources
    /// schedule their first arrivals here.
    fn init(&self, _id: StationId, _sim: &mut SimulationData) {}

    /// A client reached this station.  The default disposes it.
    fn arrival(&self, id: StationId, sim: &mut SimulationData, client: Box<Client>) {
        sim.leave_system(id, client);
    }

    /// The warm-up phase just ended.
    fn end_warm_up(&self, _id: StationId, _sim: &mut SimulationData) {}

    /// Hand over every client this station still holds.  Used to dispose
    /// the remaining clients at the end of a replication.
    fn take_clients(&self, _id: StationId, _sim: &mut SimulationData) -> Vec<Box<Client>> {
        Vec::new()
    }

    // ── Listener hooks ────────────────────────────────────────────────────

    /// The system state changed.  Returns `true` if the station scheduled
    /// new events; the round then stops.
    fn state_change(&self, _id: StationId, _sim: &mut SimulationData) -> bool {
        false
    }

    /// Periodic check.  Returns `false` when the station no longer needs
    /// timed checks.
    fn interested_in_timed_checks(&self, _id: StationId, _sim: &mut SimulationData) -> bool {
        false
    }

    fn client_move(&self, _id: StationId, _sim: &mut SimulationData, _client: &Client, _by_transport: bool) {}

    fn transporter_move(&self, _id: StationId, _sim: &mut SimulationData, _unit: TransporterRef) {}

    fn signal(&self, _id: StationId, _sim: &mut SimulationData, _name: &str) {}

    fn section_leave(&self, _id: StationId, _sim: &mut SimulationData, _client: &Client, _entry: &SectionEntry) {}

    // ── Resources ─────────────────────────────────────────────────────────

    /// Priority of this station in the released-resources round.  `Some`
    /// makes the station a listener of that round.
    fn resource_priority(&self) -> Option<Arc<dyn Expression>> {
        None
    }

    /// Resources were released and this station is next in line.
    fn released_resources(&self, _id: StationId, _sim: &mut SimulationData) {}

    /// Priority of the best waiting client, used to break ties between
    /// stations with the same resource priority.
    fn secondary_resource_priority(&self, _id: StationId, _sim: &mut SimulationData) -> f64 {
        f64::MIN
    }

    // ── Transporters ──────────────────────────────────────────────────────

    /// Priority with which this station keeps a transporter parked here.
    /// `None` lets every request take it.
    fn stay_here_priority(&self, _id: StationId, _sim: &SimulationData, _unit: TransporterRef) -> Option<f64> {
        None
    }

    /// Priority with which this station asks for the free transporter.
    /// `None` means no request.
    fn transporter_request_priority(
        &self,
        _id:   StationId,
        _sim:  &mut SimulationData,
        _unit: TransporterRef,
    ) -> Option<f64> {
        None
    }

    /// The transporter is free and this station may use it.
    fn transporter_free(&self, _id: StationId, _sim: &mut SimulationData, _unit: TransporterRef) {}

    /// A transporter parked here is leaving.
    fn transporter_leave(&self, _id: StationId, _sim: &mut SimulationData, _unit: TransporterRef) {}

    /// A transporter set off towards this station.
    fn transporter_starts_moving(&self, _id: StationId, _sim: &mut SimulationData, _unit: TransporterRef) {}
}
