//! Thread-local state of one resource group.
//!
//! # Representation
//!
//! Plain fixed groups are tracked by counters alone (`in_use`, `available`).
//! Groups with failures or setup times, and groups that were resized, keep an
//! [`Operator`] per unit.  Schedule and unlimited groups never have operators.
//!
//! # Pending checks
//!
//! The group cannot schedule events itself.  When an operator pauses, or the
//! first request hits a schedule group, a [`ResourceCheck`] is queued; the
//! runtime drains the queue into events after every call.

use std::sync::Arc;

use qs_core::{CalcOrigin, EvalCtx, FailureSpec, ResourceId, SimTime, StationId};
use qs_stats::{IndicatorHandle, Statistics};
use tracing::debug;

use crate::operator::{Operator, Transition};
use crate::template::{Capacity, ResourceCosts, ResourceTemplate, SetupTime};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Work the runtime must schedule on behalf of a group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceCheck {
    /// Re-evaluate operator status when a pause ends.
    Status { at: SimTime },
    /// Re-test waiting clients at every slot boundary of a schedule.
    Periodic { first: SimTime, every_ms: u64 },
}

#[derive(Copy, Clone, Debug)]
struct GroupHandles {
    count:         IndicatorHandle,
    usage:         IndicatorHandle,
    down_time:     IndicatorHandle,
    costs_active:  IndicatorHandle,
    costs_process: IndicatorHandle,
    costs_idle:    IndicatorHandle,
}

impl GroupHandles {
    fn resolve(name: &str, stats: &mut Statistics) -> Self {
        Self {
            count:         stats.resource_count.register(name),
            usage:         stats.resource_usage.register(name),
            down_time:     stats.resource_down_time.register(name),
            costs_active:  stats.resource_costs_active.register(name),
            costs_process: stats.resource_costs_process.register(name),
            costs_idle:    stats.resource_costs_idle.register(name),
        }
    }
}

#[derive(Default)]
struct DownDelta {
    started: u32,
    ended:   u32,
}

impl DownDelta {
    fn add(&mut self, tr: Transition, pending: &mut Vec<ResourceCheck>) {
        if tr.pause_ended {
            self.ended += 1;
        }
        if let Some(at) = tr.pause_started {
            self.started += 1;
            pending.push(ResourceCheck::Status { at });
        }
    }

    fn is_empty(&self) -> bool {
        self.started == 0 && self.ended == 0
    }
}

#[derive(Clone, Debug)]
pub struct ResourceGroup {
    id:                ResourceId,
    name:              String,
    origin:            CalcOrigin,
    capacity:          Capacity,
    /// Current fixed count; unused for schedule and unlimited groups.
    available:         u32,
    failures:          Arc<[FailureSpec]>,
    costs:             ResourceCosts,
    setup:             Option<SetupTime>,
    needs_operators:   bool,
    in_use:            u32,
    in_down_time:      u32,
    operators:         Option<Vec<Operator>>,
    first_request:     bool,
    last_state_change: SimTime,
    last_in_use:       u32,
    handles:           Option<GroupHandles>,
    pending:           Vec<ResourceCheck>,
}

impl ResourceGroup {
    /// Thread-local instance of `template`.
    pub fn from_template(id: ResourceId, template: &ResourceTemplate) -> Self {
        let available = match template.capacity {
            Capacity::Fixed(n) => n,
            _ => 0,
        };
        Self {
            id,
            name: template.name.clone(),
            origin: CalcOrigin::Resource(template.name.clone()),
            capacity: template.capacity.clone(),
            available,
            failures: template.failures.clone().into(),
            costs: template.costs,
            setup: template.setup.clone(),
            needs_operators: template.needs_operators(),
            in_use: 0,
            in_down_time: 0,
            operators: None,
            first_request: true,
            last_state_change: SimTime::ZERO,
            last_in_use: 0,
            handles: None,
            pending: Vec::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    pub fn in_down_time(&self) -> u32 {
        self.in_down_time
    }

    /// Current fixed count; `None` for schedule and unlimited groups.
    pub fn fixed_count(&self) -> Option<u32> {
        matches!(self.capacity, Capacity::Fixed(_)).then_some(self.available)
    }

    /// Largest demand this group can ever satisfy.
    pub fn max_available(&self) -> u32 {
        match &self.capacity {
            Capacity::Fixed(_) => self.available,
            Capacity::Unlimited => u32::MAX,
            Capacity::Schedule(s) => s.max_value(),
        }
    }

    pub fn operators(&self) -> &[Operator] {
        self.operators.as_deref().unwrap_or(&[])
    }

    pub fn has_operators(&self) -> bool {
        self.operators.is_some()
    }

    /// Checks queued since the last drain.
    pub fn drain_checks(&mut self) -> std::vec::Drain<'_, ResourceCheck> {
        self.pending.drain(..)
    }

    // ── Setup ─────────────────────────────────────────────────────────────

    /// Materialise operators for groups with failures or setup times.
    pub fn prepare_operators(&mut self, ctx: &mut EvalCtx<'_>) {
        if self.needs_operators && self.operators.is_none() {
            self.init_operators(ctx);
        }
    }

    fn init_operators(&mut self, ctx: &mut EvalCtx<'_>) {
        if !matches!(self.capacity, Capacity::Fixed(_)) {
            return;
        }
        let mut ops: Vec<Operator> = (0..self.available as usize)
            .map(|i| Operator::new(i, &self.failures, ctx, &self.origin))
            .collect();
        let busy = (self.in_use as usize).min(ops.len());
        for op in &mut ops[..busy] {
            op.start_working(StationId::INVALID, None, ctx, &self.origin);
        }
        self.operators = Some(ops);
    }

    /// Restart cost accounting at `now` (end of the warm-up).
    pub fn restart_at(&mut self, now: SimTime) {
        self.last_state_change = now;
    }

    // ── Allocation ────────────────────────────────────────────────────────

    /// `true` if `needed` units can be allocated right now.  Advances every
    /// operator's failure clock.
    pub fn can_allocate(&mut self, needed: u32, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> bool {
        if needed == 0 {
            return true;
        }
        if self.first_request {
            self.first_request = false;
            if let Capacity::Schedule(s) = &self.capacity {
                let every_ms = s.slot_secs().max(1) * 1_000;
                let now = ctx.now.as_millis();
                let first = if now <= every_ms { every_ms } else { now.div_ceil(every_ms) * every_ms };
                self.pending.push(ResourceCheck::Periodic { first: SimTime(first), every_ms });
            }
        }

        match &self.capacity {
            Capacity::Unlimited => return true,
            Capacity::Schedule(s) => {
                return s.value_at(ctx.now.as_millis() / 1_000) >= self.in_use + needed;
            }
            Capacity::Fixed(_) => {}
        }
        if self.operators.is_some() {
            let (delta, idle) = self.refresh_operators(ctx);
            self.apply_down(delta, ctx, stats);
            if idle < needed {
                return false;
            }
        }
        self.available >= self.in_use + needed
    }

    /// Allocate `needed` units for a job at `station`.  Call only after a
    /// successful [`can_allocate`](Self::can_allocate).  Returns the largest
    /// setup time (seconds) among the allocated operators.
    pub fn allocate(
        &mut self,
        needed:  u32,
        station: StationId,
        ctx:     &mut EvalCtx<'_>,
        stats:   &mut Statistics,
    ) -> f64 {
        if needed == 0 {
            return 0.0;
        }
        let mut setup = 0.0f64;
        let mut delta = DownDelta::default();
        {
            let Self { operators, failures, origin, setup: setup_time, pending, .. } = self;
            if let Some(ops) = operators {
                let mut allocated = 0;
                for op in ops.iter_mut() {
                    if allocated == needed {
                        break;
                    }
                    if op.is_working() {
                        continue;
                    }
                    delta.add(op.refresh(failures, ctx, origin), pending);
                    if op.is_available_or_working() {
                        setup = setup.max(op.start_working(station, setup_time.as_ref(), ctx, origin));
                        allocated += 1;
                    }
                }
            }
        }
        self.in_use += needed;
        self.apply_down(delta, ctx, stats);
        self.record_statistics(ctx, stats);
        setup
    }

    /// Release `needed` units.  Working operators are freed oldest job first.
    pub fn release(&mut self, needed: u32, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) {
        if needed == 0 {
            return;
        }
        let mut delta = DownDelta::default();
        {
            let Self { operators, failures, origin, pending, .. } = self;
            if let Some(ops) = operators {
                for _ in 0..needed {
                    let oldest = ops
                        .iter()
                        .enumerate()
                        .filter_map(|(i, op)| op.working_since().map(|t| (t, i)))
                        .min();
                    let Some((_, i)) = oldest else {
                        break;
                    };
                    delta.add(ops[i].end_working(failures, ctx, origin), pending);
                }
            }
        }
        self.in_use = self.in_use.saturating_sub(needed);
        self.apply_down(delta, ctx, stats);

        let surplus = self.operators.as_ref().is_some_and(|ops| ops.len() > self.available as usize);
        if surplus {
            self.record_statistics(ctx, stats);
            self.try_reduce_operator_count(self.available, ctx, stats);
        }
        self.record_statistics(ctx, stats);
    }

    /// Change the fixed count.  Refused for schedule, unlimited and failure
    /// groups and for a count of zero.  Shrinking only removes idle units;
    /// busy ones are dropped as they are released.
    pub fn resize(&mut self, new_count: u32, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> bool {
        if !matches!(self.capacity, Capacity::Fixed(_)) || !self.failures.is_empty() || new_count == 0 {
            return false;
        }
        if new_count == self.available {
            return true;
        }
        if self.operators.is_none() {
            self.init_operators(ctx);
        }
        self.record_statistics(ctx, stats);
        if new_count > self.available {
            let Self { operators, failures, origin, .. } = self;
            if let Some(ops) = operators {
                for i in ops.len()..new_count as usize {
                    ops.push(Operator::new(i, failures, ctx, origin));
                }
            }
        } else {
            self.try_reduce_operator_count(new_count, ctx, stats);
        }
        self.available = new_count;
        self.capacity = Capacity::Fixed(new_count);
        debug!(resource = %self.name, count = new_count, "resource resized");
        self.record_statistics(ctx, stats);
        true
    }

    /// Keep every working operator plus `count - working` idle ones.
    fn try_reduce_operator_count(&mut self, count: u32, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) {
        let Some(ops) = self.operators.as_mut() else {
            return;
        };
        if ops.len() <= count as usize {
            return;
        }
        let working = ops.iter().filter(|o| o.is_working()).count();
        let mut keep_idle = (count as usize).saturating_sub(working);
        ops.retain(|o| {
            if o.is_working() {
                return true;
            }
            if keep_idle > 0 {
                keep_idle -= 1;
                return true;
            }
            false
        });
        for (i, op) in ops.iter_mut().enumerate() {
            op.index = i;
        }
        let paused = ops.iter().filter(|o| !o.is_available_or_working()).count() as u32;
        if paused != self.in_down_time {
            self.in_down_time = paused;
            self.set_down_indicator(ctx, stats);
        }
    }

    // ── Status ────────────────────────────────────────────────────────────

    /// Refresh every operator.  Returns the down-time changes and the number
    /// of idle, available operators.
    fn refresh_operators(&mut self, ctx: &mut EvalCtx<'_>) -> (DownDelta, u32) {
        let mut delta = DownDelta::default();
        let mut idle = 0;
        let Self { operators, failures, origin, pending, .. } = self;
        if let Some(ops) = operators {
            for op in ops.iter_mut() {
                if op.is_working() {
                    continue;
                }
                delta.add(op.refresh(failures, ctx, origin), pending);
                if op.is_available_or_working() {
                    idle += 1;
                }
            }
        }
        (delta, idle)
    }

    fn apply_down(&mut self, delta: DownDelta, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        if delta.is_empty() {
            return;
        }
        self.in_down_time = (self.in_down_time + delta.started).saturating_sub(delta.ended);
        debug!(
            resource = %self.name,
            started = delta.started,
            ended = delta.ended,
            down = self.in_down_time,
            "operator down time changed"
        );
        self.set_down_indicator(ctx, stats);
    }

    fn set_down_indicator(&mut self, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        let h = self.handles(stats);
        stats.resource_down_time.get_mut(h.down_time).set(ctx.now.as_secs_f64(), self.in_down_time);
    }

    /// Advance every operator's failure clock.
    pub fn update_status(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) {
        let (delta, _) = self.refresh_operators(ctx);
        self.apply_down(delta, ctx, stats);
    }

    /// Operators currently present (available or working).
    pub fn count(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        if self.operators.is_some() {
            self.update_status(ctx, stats);
            return self.operators().iter().filter(|o| o.is_available_or_working()).count() as u32;
        }
        match &self.capacity {
            Capacity::Fixed(_) => self.available,
            Capacity::Unlimited => 0,
            Capacity::Schedule(s) => s.value_at(ctx.now.as_millis() / 1_000),
        }
    }

    /// Time-average of the count so far.
    pub fn count_average(&mut self, stats: &mut Statistics) -> f64 {
        let tracked = match &self.capacity {
            Capacity::Fixed(_) => self.operators.is_some(),
            Capacity::Unlimited => return 0.0,
            Capacity::Schedule(_) => true,
        };
        if !tracked {
            return self.available as f64;
        }
        let h = self.handles(stats);
        stats.resource_count.get(h.count).time_mean()
    }

    /// Operators currently in a failure pause.
    pub fn down_count(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        if self.operators.is_none() {
            return 0;
        }
        self.update_status(ctx, stats);
        self.operators().iter().filter(|o| !o.is_available_or_working()).count() as u32
    }

    // ── Statistics ────────────────────────────────────────────────────────

    fn handles(&mut self, stats: &mut Statistics) -> GroupHandles {
        *self.handles.get_or_insert_with(|| GroupHandles::resolve(&self.name, stats))
    }

    /// Operator-hours available between two instants.
    fn available_hours(&self, from: SimTime, to: SimTime) -> f64 {
        match &self.capacity {
            Capacity::Unlimited => 0.0,
            Capacity::Schedule(s) => s.available_hours(from.as_millis() / 1_000, to.as_millis() / 1_000),
            Capacity::Fixed(_) => self.available as f64 * to.since(from) as f64 / MS_PER_HOUR,
        }
    }

    /// Write count, usage, costs and the global usage at `ctx.now`.
    pub fn record_statistics(&mut self, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        let h = self.handles(stats);
        let now = ctx.now;
        let t = now.as_secs_f64();

        let count = match &self.capacity {
            Capacity::Fixed(_) => self.operators.as_ref().map_or(self.available, |ops| ops.len() as u32),
            Capacity::Unlimited => 0,
            Capacity::Schedule(s) => s.value_at(now.as_millis() / 1_000),
        };
        stats.resource_count.get_mut(h.count).set(t, count);

        if !self.costs.is_zero() && !ctx.warm_up && now != self.last_state_change {
            let used_hours = self.last_in_use as f64 * now.since(self.last_state_change) as f64 / MS_PER_HOUR;
            if self.costs.per_process_hour != 0.0 && self.last_in_use > 0 {
                stats.resource_costs_process.get_mut(h.costs_process).add(self.costs.per_process_hour * used_hours);
            }
            if self.costs.per_active_hour != 0.0 || self.costs.per_idle_hour != 0.0 {
                let available_hours = self.available_hours(self.last_state_change, now);
                stats
                    .resource_costs_active
                    .get_mut(h.costs_active)
                    .add(self.costs.per_active_hour * used_hours.max(available_hours));
                stats
                    .resource_costs_idle
                    .get_mut(h.costs_idle)
                    .add(self.costs.per_idle_hour * (available_hours - used_hours).max(0.0));
            }
        }

        stats.resource_usage.get_mut(h.usage).set(t, self.in_use);
        let global = stats.resource_usage_all.current();
        stats.resource_usage_all.set(t, (global + self.in_use).saturating_sub(self.last_in_use));
        self.last_in_use = self.in_use;
        self.last_state_change = now;
    }

    /// Sum of this group's costs so far.
    pub fn costs(&mut self, stats: &mut Statistics) -> f64 {
        let h = self.handles(stats);
        stats.resource_costs_active.get(h.costs_active).value()
            + stats.resource_costs_process.get(h.costs_process).value()
            + stats.resource_costs_idle.get(h.costs_idle).value()
    }
}
