//! Resource definitions as they come from the compiled model.
//!
//! A `ResourceTemplate` is immutable and shared; every worker thread builds
//! its own [`ResourceGroup`](crate::ResourceGroup) from it.

use std::sync::Arc;

use qs_core::{FailureSpec, FailureTrigger, TimeBase, TimeSource};

use crate::error::{ResourceError, ResourceResult};
use crate::schedule::Schedule;

// ── Capacity ──────────────────────────────────────────────────────────────────

/// How many operators a group has.
#[derive(Clone, Debug)]
pub enum Capacity {
    Fixed(u32),
    Unlimited,
    Schedule(Arc<dyn Schedule>),
}

// ── Costs / setup ─────────────────────────────────────────────────────────────

/// Costs per hour.  Active covers the whole available time, process only the
/// time operators are working, idle the available but unused time.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ResourceCosts {
    pub per_active_hour:  f64,
    pub per_process_hour: f64,
    pub per_idle_hour:    f64,
}

impl ResourceCosts {
    pub fn is_zero(&self) -> bool {
        self.per_active_hour == 0.0 && self.per_process_hour == 0.0 && self.per_idle_hour == 0.0
    }
}

/// Setup time an operator needs when it moves to a different station.
#[derive(Clone, Debug)]
pub struct SetupTime {
    pub source: TimeSource,
    /// Unit of the sampled value.
    pub base:   TimeBase,
}

// ── ResourceTemplate ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ResourceTemplate {
    pub name:     String,
    pub capacity: Capacity,
    pub failures: Vec<FailureSpec>,
    pub costs:    ResourceCosts,
    pub setup:    Option<SetupTime>,
}

impl ResourceTemplate {
    pub fn new(name: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            name: name.into(),
            capacity,
            failures: Vec::new(),
            costs: ResourceCosts::default(),
            setup: None,
        }
    }

    pub fn fixed(name: impl Into<String>, count: u32) -> Self {
        Self::new(name, Capacity::Fixed(count))
    }

    pub fn with_failure(mut self, failure: FailureSpec) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_costs(mut self, costs: ResourceCosts) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_setup(mut self, source: TimeSource, base: TimeBase) -> Self {
        self.setup = Some(SetupTime { source, base });
        self
    }

    /// Largest number of units a single demand may request.
    pub fn max_available(&self) -> u32 {
        match &self.capacity {
            Capacity::Fixed(n) => *n,
            Capacity::Unlimited => u32::MAX,
            Capacity::Schedule(s) => s.max_value(),
        }
    }

    /// Individual operator objects are needed for failures and setup times.
    pub fn needs_operators(&self) -> bool {
        matches!(self.capacity, Capacity::Fixed(_)) && (!self.failures.is_empty() || self.setup.is_some())
    }

    pub fn validate(&self) -> ResourceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ResourceError::EmptyName);
        }
        match &self.capacity {
            Capacity::Fixed(0) => return Err(ResourceError::ZeroCapacity(self.name.clone())),
            Capacity::Schedule(s) => {
                if s.slot_secs() == 0 || s.max_value() == 0 {
                    return Err(ResourceError::EmptySchedule(self.name.clone()));
                }
                if !self.failures.is_empty() {
                    return Err(ResourceError::ScheduleWithFailures(self.name.clone()));
                }
            }
            _ => {}
        }
        if self.failures.iter().any(|f| matches!(f.trigger, FailureTrigger::Distance(_))) {
            return Err(ResourceError::DistanceTrigger(self.name.clone()));
        }
        Ok(())
    }
}

/// Validate every template and reject names that differ only in case.
pub fn validate_all(templates: &[ResourceTemplate]) -> ResourceResult<()> {
    for (i, t) in templates.iter().enumerate() {
        t.validate()?;
        if templates[..i].iter().any(|o| o.name.eq_ignore_ascii_case(&t.name)) {
            return Err(ResourceError::DuplicateName(t.name.clone()));
        }
    }
    Ok(())
}
