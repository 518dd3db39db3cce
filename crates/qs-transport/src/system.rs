//! The thread-local transporter fleets.
//!
//! Like resource groups, the system cannot schedule events itself.  Moves
//! return a [`MoveOutcome`] whose arrival the runtime schedules, and failure
//! bookkeeping queues [`TransportCheck`]s that the runtime drains into
//! events after every call.

use std::sync::Arc;

use qs_core::{
    CalcOrigin, EvalCtx, Expression, FailureClock, FailureSpec, SimTime, StationId, TimeSource,
    TransporterTypeId,
};
use qs_stats::{IndicatorHandle, Statistics};
use tracing::debug;

use crate::distance::DistanceMatrix;
use crate::error::{TransportError, TransportResult};
use crate::template::TransporterTemplate;
use crate::transporter::{Transporter, TransporterRef};

/// Work the runtime must schedule on behalf of a fleet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportCheck {
    /// An interval failure trigger comes due.  Pauses the transporter if it
    /// is idle; a busy one is tested again when it is freed.
    PauseCheck { at: SimTime, unit: TransporterRef },
    /// A failure pause ends.
    PauseEnd { at: SimTime, unit: TransporterRef },
}

impl TransportCheck {
    pub fn at(&self) -> SimTime {
        match *self {
            TransportCheck::PauseCheck { at, .. } | TransportCheck::PauseEnd { at, .. } => at,
        }
    }
}

/// Result of [`TransporterSystem::move_to`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    pub duration_ms: u64,
    pub distance:    f64,
    /// Placement at the start station; no actual travel happened.
    pub initial:     bool,
    pub from:        StationId,
    pub to:          StationId,
}

impl MoveOutcome {
    pub fn arrival_at(&self, now: SimTime) -> SimTime {
        now.offset(self.duration_ms)
    }
}

/// Result of freeing a transporter or ending its pause.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FreeOutcome {
    /// Available; the runtime fires the release-transporter notify.
    Free,
    Paused { until: SimTime },
}

#[derive(Copy, Clone, Debug)]
struct FleetHandles {
    usage:     IndicatorHandle,
    down_time: IndicatorHandle,
}

/// All transporters of one type.
#[derive(Debug)]
struct Fleet {
    name:         String,
    origin:       CalcOrigin,
    capacity:     u32,
    travel_time:  Option<Arc<dyn Expression>>,
    load:         Option<TimeSource>,
    unload:       Option<TimeSource>,
    failures:     Arc<[FailureSpec]>,
    distances:    DistanceMatrix,
    units:        Vec<Transporter>,
    in_down_time: u32,
    handles:      Option<FleetHandles>,
}

impl Fleet {
    fn from_template(t: &TransporterTemplate) -> Self {
        let mut units = Vec::with_capacity(t.count() as usize);
        for &(station, n) in &t.placement {
            for _ in 0..n {
                units.push(Transporter::new(units.len(), t.capacity, station, t.failures.len()));
            }
        }
        Self {
            name: t.name.clone(),
            origin: CalcOrigin::Transporter(t.name.clone()),
            capacity: t.capacity,
            travel_time: t.travel_time.clone(),
            load: t.load.clone(),
            unload: t.unload.clone(),
            failures: t.failures.clone().into(),
            distances: t.distances.clone(),
            units,
            in_down_time: 0,
            handles: None,
        }
    }

    fn handles(&mut self, stats: &mut Statistics) -> FleetHandles {
        *self.handles.get_or_insert_with(|| FleetHandles {
            usage:     stats.transporter_usage.register(&self.name),
            down_time: stats.transporter_down_time.register(&self.name),
        })
    }

    fn working(&self) -> u32 {
        self.units.iter().filter(|t| t.in_transfer).count() as u32
    }

    /// Record the number of moving transporters.
    fn record_usage(&mut self, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        if ctx.warm_up {
            return;
        }
        let h = self.handles(stats);
        let working = self.working();
        stats.transporter_usage.get_mut(h.usage).set(ctx.now.as_secs_f64(), working);
    }

    fn change_down(&mut self, started: bool, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        self.in_down_time = if started { self.in_down_time + 1 } else { self.in_down_time.saturating_sub(1) };
        debug!(transporter = %self.name, down = self.in_down_time, started, "transporter down time changed");
        if ctx.warm_up {
            return;
        }
        let h = self.handles(stats);
        stats.transporter_down_time.get_mut(h.down_time).set(ctx.now.as_secs_f64(), self.in_down_time);
    }
}

/// Seconds to travel `distance`, plus load and unload times when carrying.
fn travel_secs(
    fleet:    &Fleet,
    distance: f64,
    carries:  bool,
    buffer:   &mut Vec<f64>,
    ctx:      &mut EvalCtx<'_>,
) -> f64 {
    let travel = match &fleet.travel_time {
        Some(expr) => ctx.eval_with_extra(expr.as_ref(), distance, buffer, &fleet.origin, 0.0),
        None => distance,
    };
    let mut secs = if travel > 0.0 { travel } else { 0.0 };
    if carries {
        for source in [&fleet.load, &fleet.unload].into_iter().flatten() {
            secs += ctx.sample_secs(source, &fleet.origin);
        }
    }
    secs
}

/// Queue a pause check for every armed interval clock of `t`.
fn push_pause_checks(t: &Transporter, unit: TransporterRef, pending: &mut Vec<TransportCheck>) {
    for clock in &t.clocks {
        if let Some(at) = clock.next_pause_at {
            pending.push(TransportCheck::PauseCheck { at, unit });
        }
    }
}

/// Start a pause if any trigger is due.  Returns the end of the pause.
fn test_start_pause(
    t:        &mut Transporter,
    failures: &[FailureSpec],
    ctx:      &mut EvalCtx<'_>,
    origin:   &CalcOrigin,
    unit:     TransporterRef,
    pending:  &mut Vec<TransportCheck>,
) -> Option<SimTime> {
    for (spec, clock) in failures.iter().zip(&mut t.clocks) {
        if !clock.is_due(spec, ctx.now) {
            continue;
        }
        let until = clock.start_pause(spec, ctx, origin);
        if until > ctx.now {
            t.online_again_at = Some(until);
            pending.push(TransportCheck::PauseEnd { at: until, unit });
            return Some(until);
        }
        // Zero downtime: back online at once.
        if spec.trigger.is_interval() {
            clock.arm(spec, ctx, origin);
            if let Some(at) = clock.next_pause_at {
                pending.push(TransportCheck::PauseCheck { at, unit });
            }
        }
    }
    None
}

fn unknown(unit: TransporterRef) -> TransportError {
    TransportError::UnknownTransporter { ty: unit.ty, index: unit.index }
}

// ── TransporterSystem ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TransporterSystem {
    fleets:  Vec<Fleet>,
    /// Variable values with the distance appended.
    buffer:  Vec<f64>,
    pending: Vec<TransportCheck>,
}

impl TransporterSystem {
    /// Thread-local fleets for `templates`, parked at their start stations.
    pub fn from_templates(templates: &[TransporterTemplate]) -> Self {
        Self {
            fleets:  templates.iter().map(Fleet::from_template).collect(),
            buffer:  Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fleets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fleets.is_empty()
    }

    /// Case-insensitive lookup.
    pub fn type_id(&self, name: &str) -> Option<TransporterTypeId> {
        self.fleets
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .map(|i| TransporterTypeId(i as u32))
    }

    pub fn type_name(&self, ty: TransporterTypeId) -> &str {
        self.fleets.get(ty.index()).map_or("", |f| f.name.as_str())
    }

    pub fn units(&self, ty: TransporterTypeId) -> &[Transporter] {
        self.fleets.get(ty.index()).map(|f| f.units.as_slice()).unwrap_or(&[])
    }

    pub fn transporter(&self, unit: TransporterRef) -> Option<&Transporter> {
        self.fleets.get(unit.ty.index())?.units.get(unit.index)
    }

    pub fn transporter_mut(&mut self, unit: TransporterRef) -> Option<&mut Transporter> {
        self.fleets.get_mut(unit.ty.index())?.units.get_mut(unit.index)
    }

    /// Every transporter of every type.
    pub fn refs(&self) -> impl Iterator<Item = TransporterRef> + '_ {
        self.fleets.iter().enumerate().flat_map(|(ty, f)| {
            (0..f.units.len()).map(move |i| TransporterRef::new(TransporterTypeId(ty as u32), i))
        })
    }

    pub fn distance(&self, ty: TransporterTypeId, from: StationId, to: StationId) -> f64 {
        self.fleets.get(ty.index()).map_or(0.0, |f| f.distances.get(from, to))
    }

    /// Arm every failure clock at `ctx.now`.
    pub fn prepare(&mut self, ctx: &mut EvalCtx<'_>) {
        let Self { fleets, pending, .. } = self;
        for (ty, fleet) in fleets.iter_mut().enumerate() {
            let Fleet { units, failures, origin, .. } = fleet;
            for t in units.iter_mut() {
                for (spec, clock) in failures.iter().zip(&mut t.clocks) {
                    *clock = FailureClock::armed(spec, ctx, origin);
                }
                push_pause_checks(t, TransporterRef::new(TransporterTypeId(ty as u32), t.index), pending);
            }
        }
    }

    // ── Moving ────────────────────────────────────────────────────────────

    /// Travel time in seconds for `distance`.  Only positive results of the
    /// travel expression count; errors go to the calculation-error sink.
    pub fn travel_time(
        &mut self,
        ty:       TransporterTypeId,
        distance: f64,
        carries:  bool,
        ctx:      &mut EvalCtx<'_>,
    ) -> f64 {
        match self.fleets.get(ty.index()) {
            Some(fleet) => travel_secs(fleet, distance, carries, &mut self.buffer, ctx),
            None => 0.0,
        }
    }

    /// Send `unit` to `target` carrying `client_count` clients.  A target
    /// equal to the current position is the initial placement and takes no
    /// time.  The caller notifies the stations and schedules the arrival.
    pub fn move_to(
        &mut self,
        unit:         TransporterRef,
        target:       StationId,
        client_count: u64,
        ctx:          &mut EvalCtx<'_>,
        stats:        &mut Statistics,
    ) -> TransportResult<MoveOutcome> {
        let Self { fleets, buffer, .. } = self;
        let fleet = fleets.get_mut(unit.ty.index()).ok_or_else(|| unknown(unit))?;
        let from = fleet.units.get(unit.index).ok_or_else(|| unknown(unit))?.position;

        let initial = target == from;
        let (distance, secs) = if initial {
            (0.0, 0.0)
        } else {
            let d = fleet.distances.get(from, target);
            (d, travel_secs(fleet, d, client_count > 0, buffer, ctx))
        };
        let duration_ms = (secs * 1_000.0).round() as u64;

        let t = &mut fleet.units[unit.index];
        t.last_position = from;
        if !initial {
            t.position = target;
            t.in_transfer = true;
            for clock in &mut t.clocks {
                clock.count_served(client_count, duration_ms, distance);
            }
            debug!(
                transporter = %fleet.name,
                index = unit.index,
                from = from.0,
                to = target.0,
                duration_ms,
                "transporter moves"
            );
            fleet.record_usage(ctx, stats);
        }
        Ok(MoveOutcome { duration_ms, distance, initial, from, to: target })
    }

    /// The transporter reached its destination.  The caller fires the
    /// transporter-move notify.
    pub fn arrival(&mut self, unit: TransporterRef, ctx: &EvalCtx<'_>, stats: &mut Statistics) -> TransportResult<()> {
        let fleet = self.fleets.get_mut(unit.ty.index()).ok_or_else(|| unknown(unit))?;
        let t = fleet.units.get_mut(unit.index).ok_or_else(|| unknown(unit))?;
        t.in_transfer = false;
        fleet.record_usage(ctx, stats);
        Ok(())
    }

    // ── Failures ──────────────────────────────────────────────────────────

    /// The transporter finished its job.  Tests the failure triggers first.
    pub fn free(
        &mut self,
        unit:  TransporterRef,
        ctx:   &mut EvalCtx<'_>,
        stats: &mut Statistics,
    ) -> TransportResult<FreeOutcome> {
        let Self { fleets, pending, .. } = self;
        let fleet = fleets.get_mut(unit.ty.index()).ok_or_else(|| unknown(unit))?;
        let t = fleet.units.get_mut(unit.index).ok_or_else(|| unknown(unit))?;
        if fleet.failures.is_empty() {
            return Ok(FreeOutcome::Free);
        }
        match test_start_pause(t, &fleet.failures, ctx, &fleet.origin, unit, pending) {
            Some(until) => {
                fleet.change_down(true, ctx, stats);
                Ok(FreeOutcome::Paused { until })
            }
            None => Ok(FreeOutcome::Free),
        }
    }

    /// Handle a [`TransportCheck::PauseCheck`].  Returns `true` if the
    /// transporter went into a pause.
    pub fn pause_check(&mut self, unit: TransporterRef, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> bool {
        let Self { fleets, pending, .. } = self;
        let Some(fleet) = fleets.get_mut(unit.ty.index()) else {
            return false;
        };
        let Some(t) = fleet.units.get_mut(unit.index) else {
            return false;
        };
        if !t.is_idle() {
            return false;
        }
        if test_start_pause(t, &fleet.failures, ctx, &fleet.origin, unit, pending).is_some() {
            fleet.change_down(true, ctx, stats);
            return true;
        }
        false
    }

    /// Handle a [`TransportCheck::PauseEnd`]: bring the transporter back
    /// online, re-arm its interval triggers and test them again.
    pub fn pause_end(
        &mut self,
        unit:  TransporterRef,
        ctx:   &mut EvalCtx<'_>,
        stats: &mut Statistics,
    ) -> TransportResult<FreeOutcome> {
        let Self { fleets, pending, .. } = self;
        let fleet = fleets.get_mut(unit.ty.index()).ok_or_else(|| unknown(unit))?;
        let Fleet { units, failures, origin, .. } = &mut *fleet;
        let t = units.get_mut(unit.index).ok_or_else(|| unknown(unit))?;
        match t.online_again_at {
            None => return Ok(FreeOutcome::Free),
            Some(until) if ctx.now < until => return Ok(FreeOutcome::Paused { until }),
            Some(_) => {}
        }
        t.online_again_at = None;
        for (spec, clock) in failures.iter().zip(&mut t.clocks) {
            if spec.trigger.is_interval() && clock.next_pause_at.is_none() {
                clock.arm(spec, ctx, origin);
                if let Some(at) = clock.next_pause_at {
                    pending.push(TransportCheck::PauseCheck { at, unit });
                }
            }
        }
        let again = test_start_pause(t, failures, ctx, origin, unit, pending);
        fleet.change_down(false, ctx, stats);
        match again {
            Some(until) => {
                fleet.change_down(true, ctx, stats);
                Ok(FreeOutcome::Paused { until })
            }
            None => Ok(FreeOutcome::Free),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// First online transporter of `ty` parked at another station than
    /// `own_station` that may leave it.  `stay_here` yields the priority
    /// with which a station keeps the given transporter; the station keeps it
    /// when that priority is at least `priority`.
    pub fn request_transporter(
        &self,
        ty:            TransporterTypeId,
        own_station:   StationId,
        priority:      f64,
        mut stay_here: impl FnMut(StationId, TransporterRef) -> Option<f64>,
    ) -> Option<usize> {
        self.units(ty)
            .iter()
            .filter(|t| !t.in_transfer && t.is_online() && t.position != own_station)
            .find(|t| {
                !stay_here(t.position, TransporterRef::new(ty, t.index)).is_some_and(|keep| keep >= priority)
            })
            .map(|t| t.index)
    }

    /// First online transporter of `ty` parked at `station`.
    pub fn waiting_transporter(&self, ty: TransporterTypeId, station: StationId) -> Option<usize> {
        self.units(ty)
            .iter()
            .find(|t| !t.in_transfer && t.is_online() && t.position == station)
            .map(|t| t.index)
    }

    /// Transporters of `ty` parked at `station`, including paused ones.
    pub fn waiting_count(&self, ty: TransporterTypeId, station: StationId) -> u32 {
        self.units(ty).iter().filter(|t| !t.in_transfer && t.position == station).count() as u32
    }

    /// Transporters of `ty` currently moving.
    pub fn working_count(&self, ty: TransporterTypeId) -> u32 {
        self.fleets.get(ty.index()).map_or(0, Fleet::working)
    }

    pub fn count(&self, ty: TransporterTypeId) -> u32 {
        self.units(ty).len() as u32
    }

    pub fn count_all(&self) -> u32 {
        self.fleets.iter().map(|f| f.units.len() as u32).sum()
    }

    /// Clients one transporter of `ty` can carry; 0 for unknown types.
    pub fn capacity(&self, ty: TransporterTypeId) -> u32 {
        self.fleets.get(ty.index()).map_or(0, |f| f.capacity)
    }

    pub fn down_count(&self, ty: TransporterTypeId) -> u32 {
        self.fleets.get(ty.index()).map_or(0, |f| f.in_down_time)
    }

    pub fn down_count_all(&self) -> u32 {
        self.fleets.iter().map(|f| f.in_down_time).sum()
    }

    /// Move every queued check into `out`.
    pub fn drain_checks(&mut self, out: &mut Vec<TransportCheck>) {
        out.append(&mut self.pending);
    }
}
