//! All resource groups of one thread.

use qs_core::{EvalCtx, ResourceId, SimTime, StationId};
use qs_stats::Statistics;

use crate::error::{ResourceError, ResourceResult};
use crate::group::{ResourceCheck, ResourceGroup};
use crate::template::ResourceTemplate;

/// How several stations waiting for the same released resource are ordered
/// when their primary priorities tie.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SecondaryPriority {
    #[default]
    Random,
    /// Prefer the station whose best waiting client has the highest priority.
    ClientPriority,
}

/// Units needed per group, indexed by `ResourceId`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceDemand(Vec<u32>);

impl ResourceDemand {
    pub fn units(&self, id: ResourceId) -> u32 {
        self.0.get(id.index()).copied().unwrap_or(0)
    }

    /// `(group, units)` for every group with a non-zero demand.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, u32)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, n)| **n > 0)
            .map(|(i, n)| (ResourceId(i as u32), *n))
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    groups:                 Vec<ResourceGroup>,
    pub secondary_priority: SecondaryPriority,
}

impl ResourceSet {
    /// Thread-local groups for `templates`.
    pub fn from_templates(templates: &[ResourceTemplate], secondary_priority: SecondaryPriority) -> Self {
        let groups = templates
            .iter()
            .enumerate()
            .map(|(i, t)| ResourceGroup::from_template(ResourceId(i as u32), t))
            .collect();
        Self { groups, secondary_priority }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, id: ResourceId) -> Option<&ResourceGroup> {
        self.groups.get(id.index())
    }

    pub fn group_mut(&mut self, id: ResourceId) -> Option<&mut ResourceGroup> {
        self.groups.get_mut(id.index())
    }

    pub fn groups(&self) -> &[ResourceGroup] {
        &self.groups
    }

    /// Case-insensitive lookup.
    pub fn id_of(&self, name: &str) -> Option<ResourceId> {
        self.groups
            .iter()
            .position(|g| g.name().eq_ignore_ascii_case(name))
            .map(|i| ResourceId(i as u32))
    }

    /// Build a demand from `(name, units)` pairs.  Unknown names, demands
    /// larger than a group can ever supply and all-zero demands are errors.
    pub fn demand(&self, needed: &[(&str, u32)]) -> ResourceResult<ResourceDemand> {
        let mut units = vec![0; self.groups.len()];
        for &(name, n) in needed {
            let id = self.id_of(name).ok_or_else(|| ResourceError::UnknownResource(name.to_owned()))?;
            let group = &self.groups[id.index()];
            if n > group.max_available() {
                return Err(ResourceError::DemandExceedsCapacity {
                    name:      group.name().to_owned(),
                    needed:    n,
                    available: group.max_available(),
                });
            }
            units[id.index()] = n;
        }
        if units.iter().all(|&n| n == 0) {
            return Err(ResourceError::EmptyDemand);
        }
        Ok(ResourceDemand(units))
    }

    pub fn prepare_operators(&mut self, ctx: &mut EvalCtx<'_>) {
        for g in &mut self.groups {
            g.prepare_operators(ctx);
        }
    }

    // ── Locking ───────────────────────────────────────────────────────────

    /// Test every group, then allocate from all of them.  Returns the largest
    /// setup time in seconds, or `None` if any group cannot supply its part.
    pub fn try_lock(
        &mut self,
        demand:  &ResourceDemand,
        station: StationId,
        ctx:     &mut EvalCtx<'_>,
        stats:   &mut Statistics,
    ) -> Option<f64> {
        for (id, n) in demand.iter() {
            let group = self.groups.get_mut(id.index())?;
            if !group.can_allocate(n, ctx, stats) {
                return None;
            }
        }
        let mut setup = 0.0f64;
        for (id, n) in demand.iter() {
            if let Some(group) = self.groups.get_mut(id.index()) {
                setup = setup.max(group.allocate(n, station, ctx, stats));
            }
        }
        Some(setup)
    }

    pub fn release(&mut self, demand: &ResourceDemand, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) {
        for (id, n) in demand.iter() {
            if let Some(group) = self.groups.get_mut(id.index()) {
                group.release(n, ctx, stats);
            }
        }
    }

    /// See [`ResourceGroup::resize`].  Unknown ids are refused.
    pub fn resize(
        &mut self,
        id:        ResourceId,
        new_count: u32,
        ctx:       &mut EvalCtx<'_>,
        stats:     &mut Statistics,
    ) -> bool {
        self.groups.get_mut(id.index()).is_some_and(|g| g.resize(new_count, ctx, stats))
    }

    // ── Counts / costs ────────────────────────────────────────────────────

    pub fn count(&mut self, id: ResourceId, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        self.groups.get_mut(id.index()).map_or(0, |g| g.count(ctx, stats))
    }

    pub fn count_all(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        self.groups.iter_mut().map(|g| g.count(ctx, stats)).sum()
    }

    pub fn count_average(&mut self, id: ResourceId, stats: &mut Statistics) -> f64 {
        self.groups.get_mut(id.index()).map_or(0.0, |g| g.count_average(stats))
    }

    pub fn down_count(&mut self, id: ResourceId, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        self.groups.get_mut(id.index()).map_or(0, |g| g.down_count(ctx, stats))
    }

    pub fn down_count_all(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) -> u32 {
        self.groups.iter_mut().map(|g| g.down_count(ctx, stats)).sum()
    }

    pub fn costs(&mut self, id: ResourceId, stats: &mut Statistics) -> f64 {
        self.groups.get_mut(id.index()).map_or(0.0, |g| g.costs(stats))
    }

    pub fn costs_all(&mut self, stats: &mut Statistics) -> f64 {
        self.groups.iter_mut().map(|g| g.costs(stats)).sum()
    }

    // ── Status / statistics ───────────────────────────────────────────────

    pub fn update_status(&mut self, ctx: &mut EvalCtx<'_>, stats: &mut Statistics) {
        for g in &mut self.groups {
            g.update_status(ctx, stats);
        }
    }

    pub fn record_statistics(&mut self, ctx: &EvalCtx<'_>, stats: &mut Statistics) {
        for g in &mut self.groups {
            g.record_statistics(ctx, stats);
        }
    }

    pub fn restart_at(&mut self, now: SimTime) {
        for g in &mut self.groups {
            g.restart_at(now);
        }
    }

    /// Move every queued check into `out`.
    pub fn drain_checks(&mut self, out: &mut Vec<(ResourceId, ResourceCheck)>) {
        for g in &mut self.groups {
            let id = g.id();
            out.extend(g.drain_checks().map(|c| (id, c)));
        }
    }
}
