//! Resource and transporter operations for stations.
//!
//! The subsystems cannot schedule events.  Every call that may queue a
//! resource or transporter check ends by draining those checks into the
//! event queue.

use std::sync::Arc;

use qs_core::{ResourceId, StationId, TransporterTypeId};
use qs_resource::{ResourceCheck, ResourceDemand};
use qs_transport::{FreeOutcome, MoveOutcome, TransportCheck, TransporterRef};

use crate::error::RunResult;
use crate::event::{
    ResourceRecheckEvent, ResourceStatusEvent, TransporterArrivalEvent, TransporterPauseCheckEvent,
    TransporterPauseEndEvent,
};
use crate::sim_data::{SimulationData, eval_ctx};

impl SimulationData {
    // ── Resources ─────────────────────────────────────────────────────────

    /// A demand from `(resource name, units)` pairs.
    pub fn resource_demand(&self, needed: &[(&str, u32)]) -> RunResult<ResourceDemand> {
        Ok(self.run_data.resources.demand(needed)?)
    }

    /// Lock `demand` for `station`.  Returns the setup time in seconds, or
    /// `None` if the resources are not available.
    pub fn try_lock_resources(&mut self, demand: &ResourceDemand, station: StationId) -> Option<f64> {
        let mut ctx = eval_ctx!(self);
        let setup = self.run_data.resources.try_lock(demand, station, &mut ctx, &mut self.stats);
        self.drain_checks();
        setup
    }

    /// Give `demand` back and offer it to the waiting stations.
    pub fn release_resources(&mut self, demand: &ResourceDemand) {
        let mut ctx = eval_ctx!(self);
        self.run_data.resources.release(demand, &mut ctx, &mut self.stats);
        self.drain_checks();
        self.fire_released_resources_notify();
    }

    /// Change the count of a fixed group.  Growing the group offers the new
    /// units to the waiting stations.
    pub fn resize_resource(&mut self, id: ResourceId, count: u32) -> bool {
        let mut ctx = eval_ctx!(self);
        let before = self.run_data.resources.count(id, &mut ctx, &mut self.stats);
        let done = self.run_data.resources.resize(id, count, &mut ctx, &mut self.stats);
        self.drain_checks();
        if done && count > before {
            self.fire_released_resources_notify();
        }
        done
    }

    pub fn resource_count(&mut self, id: ResourceId) -> u32 {
        let mut ctx = eval_ctx!(self);
        self.run_data.resources.count(id, &mut ctx, &mut self.stats)
    }

    pub fn resource_down_count(&mut self, id: ResourceId) -> u32 {
        let mut ctx = eval_ctx!(self);
        self.run_data.resources.down_count(id, &mut ctx, &mut self.stats)
    }

    // ── Transporters ──────────────────────────────────────────────────────

    /// Send `unit` to `target` carrying `clients` clients.  The origin
    /// station sees the unit leave, the target sees it start moving, and
    /// the arrival is scheduled.
    pub fn move_transporter(&mut self, unit: TransporterRef, target: StationId, clients: u64) -> RunResult<MoveOutcome> {
        let mut ctx = eval_ctx!(self);
        let outcome = self.run_data.transporters.move_to(unit, target, clients, &mut ctx, &mut self.stats)?;
        self.drain_checks();

        let model = Arc::clone(&self.model);
        if !outcome.initial
            && let Some(station) = model.station(outcome.from)
        {
            station.transporter_leave(outcome.from, self, unit);
        }
        if let Some(station) = model.station(target) {
            station.transporter_starts_moving(target, self, unit);
        }
        let at = outcome.arrival_at(self.now());
        self.queue.schedule(at, Box::new(TransporterArrivalEvent { unit }));
        Ok(outcome)
    }

    pub(crate) fn transporter_arrived(&mut self, unit: TransporterRef) {
        let ctx = eval_ctx!(self);
        if let Err(err) = self.run_data.transporters.arrival(unit, &ctx, &mut self.stats) {
            self.emergency_shutdown(err.to_string());
            return;
        }
        self.fire_transporter_move_notify(unit);
    }

    /// `unit` finished its job.  Unless a failure pauses it, it is offered
    /// to the stations asking for a transporter.
    pub fn free_transporter(&mut self, unit: TransporterRef) {
        let mut ctx = eval_ctx!(self);
        let outcome = self.run_data.transporters.free(unit, &mut ctx, &mut self.stats);
        self.drain_checks();
        match outcome {
            Ok(FreeOutcome::Free) => self.fire_release_transporter_notify(unit),
            Ok(FreeOutcome::Paused { .. }) => {}
            Err(err) => self.emergency_shutdown(err.to_string()),
        }
    }

    pub(crate) fn transporter_pause_check(&mut self, unit: TransporterRef) {
        let mut ctx = eval_ctx!(self);
        self.run_data.transporters.pause_check(unit, &mut ctx, &mut self.stats);
        self.drain_checks();
    }

    pub(crate) fn transporter_pause_end(&mut self, unit: TransporterRef) {
        let mut ctx = eval_ctx!(self);
        let outcome = self.run_data.transporters.pause_end(unit, &mut ctx, &mut self.stats);
        self.drain_checks();
        match outcome {
            Ok(FreeOutcome::Free) => self.fire_release_transporter_notify(unit),
            Ok(FreeOutcome::Paused { .. }) => {}
            Err(err) => self.emergency_shutdown(err.to_string()),
        }
    }

    /// A transporter of `ty` that may leave its station for `own_station`,
    /// asking the parking stations for their stay-here priority.
    pub fn request_transporter(
        &self,
        ty:          TransporterTypeId,
        own_station: StationId,
        priority:    f64,
    ) -> Option<TransporterRef> {
        let model = &self.model;
        self.run_data
            .transporters
            .request_transporter(ty, own_station, priority, |position, unit| {
                model.station(position).and_then(|s| s.stay_here_priority(position, self, unit))
            })
            .map(|index| TransporterRef::new(ty, index))
    }

    /// An idle transporter of `ty` parked at `station`.
    pub fn waiting_transporter(&self, ty: TransporterTypeId, station: StationId) -> Option<TransporterRef> {
        self.run_data
            .transporters
            .waiting_transporter(ty, station)
            .map(|index| TransporterRef::new(ty, index))
    }

    // ── Pending checks ────────────────────────────────────────────────────

    /// Turn the checks queued by the resource and transporter subsystems
    /// into events.
    pub(crate) fn drain_checks(&mut self) {
        let mut resource_checks = Vec::new();
        self.run_data.resources.drain_checks(&mut resource_checks);
        for (_, check) in resource_checks {
            match check {
                ResourceCheck::Status { at } => self.queue.schedule(at, Box::new(ResourceStatusEvent)),
                ResourceCheck::Periodic { first, every_ms } => {
                    self.run_data.recheck_events += 1;
                    self.queue.schedule(first, Box::new(ResourceRecheckEvent { every_ms }));
                }
            }
        }

        let mut transport_checks = Vec::new();
        self.run_data.transporters.drain_checks(&mut transport_checks);
        for check in transport_checks {
            match check {
                TransportCheck::PauseCheck { at, unit } => {
                    self.queue.schedule(at, Box::new(TransporterPauseCheckEvent { unit }))
                }
                TransportCheck::PauseEnd { at, unit } => {
                    self.queue.schedule(at, Box::new(TransporterPauseEndEvent { unit }))
                }
            }
        }
    }
}
