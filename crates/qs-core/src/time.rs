//! Simulation time model.
//!
//! # Design
//!
//! Simulated time is an integer millisecond counter, `SimTime`.  Model-level
//! quantities (service times, downtimes, travel times) are sampled as `f64`
//! seconds and converted with [`SimTime::from_secs_f64`], which rounds to the
//! nearest millisecond.  Keeping the canonical clock integral makes event
//! ordering exact and lets "at most once per millisecond" rules compare times
//! with `==`.

use std::fmt;

// ── SimTime ───────────────────────────────────────────────────────────────────

/// An absolute simulation time in milliseconds since the start of the
/// current replication.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Whole seconds to `SimTime`.
    #[inline]
    pub fn from_secs(secs: u64) -> SimTime {
        SimTime(secs.saturating_mul(1_000))
    }

    /// Fractional seconds to `SimTime`, rounded to the nearest millisecond.
    /// Negative and NaN inputs map to zero.
    #[inline]
    pub fn from_secs_f64(secs: f64) -> SimTime {
        if secs.is_nan() || secs <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime((secs * 1_000.0).round() as u64)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Return the time `ms` milliseconds after `self`.
    #[inline]
    pub fn offset(self, ms: u64) -> SimTime {
        SimTime(self.0.saturating_add(ms))
    }

    /// Milliseconds elapsed from `earlier` to `self` (zero if `earlier` is later).
    #[inline]
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Add<u64> for SimTime {
    type Output = SimTime;
    #[inline]
    fn add(self, rhs: u64) -> SimTime {
        self.offset(rhs)
    }
}

impl std::ops::Sub for SimTime {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: SimTime) -> u64 {
        self.since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1_000, self.0 % 1_000)
    }
}

// ── TimeBase ──────────────────────────────────────────────────────────────────

/// Unit in which a model quantity (e.g. an operator setup time) is expressed.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeBase {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeBase {
    /// Multiply a value in this unit by the returned factor to get seconds.
    #[inline]
    pub fn to_secs_factor(self) -> f64 {
        match self {
            TimeBase::Seconds => 1.0,
            TimeBase::Minutes => 60.0,
            TimeBase::Hours => 3_600.0,
            TimeBase::Days => 86_400.0,
        }
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Run-level configuration that is independent of the compiled model.
///
/// Model-level settings (termination rules, warm-up, calculation-error
/// policy) live on `RunModel` in `qs-run`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Master RNG seed.  The same seed and thread count always produce
    /// identical results.
    pub seed: u64,

    /// Worker thread count.  `None` uses all logical cores.
    pub num_threads: Option<usize>,

    /// Interactive animation run: single thread, lower entity ceiling.
    pub animation: bool,

    /// Hand out arrivals through a shared `DynamicLoadBalancer` instead of a
    /// fixed per-thread split (only used for single-replication runs).
    pub dynamic_load_balance: bool,

    /// Force-dispose every client still held by a station at replication end.
    pub dispose_at_end: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed:                 0,
            num_threads:          None,
            animation:            false,
            dynamic_load_balance: true,
            dispose_at_end:       false,
        }
    }
}

impl SimConfig {
    /// Resolved worker count (at least 1; animation runs are single-threaded).
    pub fn thread_count(&self) -> usize {
        if self.animation {
            return 1;
        }
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}
