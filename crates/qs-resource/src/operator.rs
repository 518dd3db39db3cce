//! Individual operators of a resource group.
//!
//! Operators are only materialised when the group needs per-unit state
//! (failures, setup times, resizing).  Each one runs a small state machine:
//!
//! ```text
//!           start_working            end_working
//!   Idle ───────────────▶ Working ───────────────▶ Idle
//!    ▲                                              │ trigger due
//!    │        now >= until                          ▼
//!    └──────────────────────────────────────── Paused { until }
//! ```
//!
//! Failure triggers are evaluated by [`Operator::refresh`], which the group
//! calls on every availability query and at the end of every job.

use qs_core::{CalcOrigin, EvalCtx, FailureClock, FailureSpec, SimTime, StationId};

use crate::template::SetupTime;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperatorState {
    Idle,
    Working { since: SimTime },
    Paused { until: SimTime },
}

/// Down-time changes caused by one refresh.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub pause_ended:   bool,
    /// End of a pause that started during the refresh.
    pub pause_started: Option<SimTime>,
}

#[derive(Clone, Debug)]
pub struct Operator {
    pub index:    usize,
    state:        OperatorState,
    last_station: StationId,
    clocks:       Vec<FailureClock>,
}

impl Operator {
    /// A fresh idle operator with one armed clock per failure rule.
    pub fn new(
        index:    usize,
        failures: &[FailureSpec],
        ctx:      &mut EvalCtx<'_>,
        origin:   &CalcOrigin,
    ) -> Self {
        let clocks = failures.iter().map(|f| FailureClock::armed(f, ctx, origin)).collect();
        Self { index, state: OperatorState::Idle, last_station: StationId::INVALID, clocks }
    }

    #[inline]
    pub fn state(&self) -> OperatorState {
        self.state
    }

    #[inline]
    pub fn is_working(&self) -> bool {
        matches!(self.state, OperatorState::Working { .. })
    }

    /// `false` while paused.  Only meaningful after [`refresh`](Self::refresh).
    #[inline]
    pub fn is_available_or_working(&self) -> bool {
        !matches!(self.state, OperatorState::Paused { .. })
    }

    pub fn working_since(&self) -> Option<SimTime> {
        match self.state {
            OperatorState::Working { since } => Some(since),
            _ => None,
        }
    }

    pub fn last_station(&self) -> StationId {
        self.last_station
    }

    pub fn clocks(&self) -> &[FailureClock] {
        &self.clocks
    }

    /// End an expired pause and start a new one if a trigger is due.
    pub fn refresh(
        &mut self,
        failures: &[FailureSpec],
        ctx:      &mut EvalCtx<'_>,
        origin:   &CalcOrigin,
    ) -> Transition {
        let mut tr = Transition::default();

        if let OperatorState::Paused { until } = self.state {
            if ctx.now < until {
                return tr;
            }
            self.state = OperatorState::Idle;
            tr.pause_ended = true;
            for (spec, clock) in failures.iter().zip(&mut self.clocks) {
                if spec.trigger.is_interval() && clock.next_pause_at.is_none() {
                    clock.arm(spec, ctx, origin);
                }
            }
        }

        if self.state != OperatorState::Idle {
            return tr;
        }
        for (spec, clock) in failures.iter().zip(&mut self.clocks) {
            if !clock.is_due(spec, ctx.now) {
                continue;
            }
            let until = clock.start_pause(spec, ctx, origin);
            if until > ctx.now {
                self.state = OperatorState::Paused { until };
                tr.pause_started = Some(until);
                break;
            }
            // Zero downtime: back online at once.
            if spec.trigger.is_interval() {
                clock.arm(spec, ctx, origin);
            }
        }
        tr
    }

    /// Start a job at `station`.  Returns the setup time in seconds, which is
    /// only due when the operator served a different station before.
    pub fn start_working(
        &mut self,
        station: StationId,
        setup:   Option<&SetupTime>,
        ctx:     &mut EvalCtx<'_>,
        origin:  &CalcOrigin,
    ) -> f64 {
        let secs = match setup {
            Some(s) if self.last_station.is_valid() && self.last_station != station => {
                ctx.sample_secs(&s.source, origin) * s.base.to_secs_factor()
            }
            _ => 0.0,
        };
        self.state = OperatorState::Working { since: ctx.now };
        self.last_station = station;
        secs
    }

    /// Finish the current job, count it on every clock and test the triggers.
    pub fn end_working(
        &mut self,
        failures: &[FailureSpec],
        ctx:      &mut EvalCtx<'_>,
        origin:   &CalcOrigin,
    ) -> Transition {
        if let OperatorState::Working { since } = self.state {
            let worked = ctx.now.since(since);
            for clock in &mut self.clocks {
                clock.count_served(1, worked, 0.0);
            }
            self.state = OperatorState::Idle;
        }
        self.refresh(failures, ctx, origin)
    }
}
