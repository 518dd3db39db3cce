//! Failure triggers and per-unit failure clocks.
//!
//! Resource operators and transporters share the same failure model: a unit
//! carries one [`FailureClock`] per configured [`FailureSpec`].  The clock
//! accumulates usage since the unit last came back online and reports when
//! the trigger is due.  The owner then calls [`FailureClock::start_pause`],
//! which samples the downtime and returns the time the unit is online again.

use std::sync::Arc;

use crate::{CalcOrigin, Distribution, EvalCtx, Expression, SimTime, TimeSource};

/// What makes a unit go down.
#[derive(Clone, Debug)]
pub enum FailureTrigger {
    /// After this many served jobs (transporters: carried clients).
    ServedCount(u64),
    /// After being online for this many seconds.
    AvailableTime(f64),
    /// After working for this many seconds.
    WorkingTime(f64),
    /// After travelling this distance.  Transporters only.
    Distance(f64),
    /// Inter-failure time in seconds drawn from a distribution.
    Distribution(Arc<dyn Distribution>),
    /// Inter-failure time in seconds given by an expression.
    Expression(Arc<dyn Expression>),
}

impl FailureTrigger {
    /// `true` for triggers that schedule the next pause at a sampled time.
    pub fn is_interval(&self) -> bool {
        matches!(self, FailureTrigger::Distribution(_) | FailureTrigger::Expression(_))
    }
}

/// One failure rule: trigger plus downtime.
#[derive(Clone, Debug)]
pub struct FailureSpec {
    pub trigger:  FailureTrigger,
    pub downtime: TimeSource,
}

impl FailureSpec {
    pub fn new(trigger: FailureTrigger, downtime: TimeSource) -> Self {
        Self { trigger, downtime }
    }
}

/// Usage counters of one unit for one failure rule.
#[derive(Clone, Debug, Default)]
pub struct FailureClock {
    /// Jobs served since the unit came online.
    pub served:        u64,
    /// Start of the current online period.
    pub online_since:  SimTime,
    /// Working milliseconds since the unit came online.
    pub working_ms:    u64,
    /// Distance travelled since the unit came online.
    pub distance:      f64,
    /// Scheduled pause for interval triggers.  `None` means no pause is due.
    pub next_pause_at: Option<SimTime>,
}

impl FailureClock {
    /// A fresh clock armed at `ctx.now`.
    pub fn armed(spec: &FailureSpec, ctx: &mut EvalCtx<'_>, origin: &CalcOrigin) -> Self {
        let mut clock = FailureClock::default();
        clock.arm(spec, ctx, origin);
        clock
    }

    /// Reset the counters and, for interval triggers, sample the next pause.
    /// A non-positive interval disables further pauses of this rule.
    pub fn arm(&mut self, spec: &FailureSpec, ctx: &mut EvalCtx<'_>, origin: &CalcOrigin) {
        self.served = 0;
        self.working_ms = 0;
        self.distance = 0.0;
        self.online_since = ctx.now;
        self.next_pause_at = None;

        let interval = match &spec.trigger {
            FailureTrigger::Distribution(d) => d.sample(ctx.rng),
            FailureTrigger::Expression(e) => ctx.eval_or(e.as_ref(), origin, 0.0),
            _ => return,
        };
        if interval > 0.0 {
            self.next_pause_at = Some(ctx.now.offset(SimTime::from_secs_f64(interval).0));
        }
    }

    /// Count finished work: `jobs` served, `working_ms` spent, `distance` moved.
    pub fn count_served(&mut self, jobs: u64, working_ms: u64, distance: f64) {
        self.served += jobs;
        self.working_ms += working_ms;
        if distance > 0.0 {
            self.distance += distance;
        }
    }

    /// `true` if the rule demands a pause at `now`.
    pub fn is_due(&self, spec: &FailureSpec, now: SimTime) -> bool {
        match &spec.trigger {
            FailureTrigger::ServedCount(n) => *n > 0 && self.served >= *n,
            FailureTrigger::AvailableTime(secs) => {
                *secs > 0.0 && now.since(self.online_since) as f64 >= secs * 1_000.0
            }
            FailureTrigger::WorkingTime(secs) => {
                *secs > 0.0 && self.working_ms as f64 >= secs * 1_000.0
            }
            FailureTrigger::Distance(d) => *d > 0.0 && self.distance >= *d,
            FailureTrigger::Distribution(_) | FailureTrigger::Expression(_) => {
                self.next_pause_at.is_some_and(|t| now >= t)
            }
        }
    }

    /// Begin a pause at `ctx.now`.  Returns the time the unit is online again.
    /// The clock stays disarmed until the owner calls [`arm`](Self::arm) at the
    /// end of the pause.
    pub fn start_pause(
        &mut self,
        spec:   &FailureSpec,
        ctx:    &mut EvalCtx<'_>,
        origin: &CalcOrigin,
    ) -> SimTime {
        let secs = ctx.sample_secs(&spec.downtime, origin);
        self.served = 0;
        self.working_ms = 0;
        self.distance = 0.0;
        self.next_pause_at = None;
        let until = ctx.now.offset(SimTime::from_secs_f64(secs).0);
        self.online_since = until;
        until
    }
}
