//! Arrival packages shared by the worker threads of a single-replication run.
//!
//! Instead of giving every thread a fixed share of the arrivals up front,
//! threads ask for packages as they go.  Large packages keep the lock cold
//! at the start; once three quarters of the arrivals are handed out the
//! packages shrink so that all threads finish at about the same time.

use std::sync::{Mutex, PoisonError};

use qs_run::ArrivalPackages;

/// Smallest package ever handed out (unless fewer arrivals remain).
pub const MIN_PACKAGE_SIZE: u64 = 10;

#[derive(Debug)]
struct Remaining {
    remaining:  u64,
    handed_out: u64,
}

#[derive(Debug)]
pub struct DynamicLoadBalancer {
    total:         u64,
    package_large: u64,
    package_small: u64,
    state:         Mutex<Remaining>,
}

impl DynamicLoadBalancer {
    /// A balancer for `total` arrivals spread over `threads` threads.
    pub fn new(total: u64, threads: usize) -> Self {
        let threads = threads.max(1) as u64;
        Self {
            total,
            package_large: (total / (threads * 20)).max(MIN_PACKAGE_SIZE),
            package_small: (total / (threads * 200)).max(MIN_PACKAGE_SIZE),
            state:         Mutex::new(Remaining { remaining: total, handed_out: 0 }),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// `(large, small)` package sizes.
    pub fn package_sizes(&self) -> (u64, u64) {
        (self.package_large, self.package_small)
    }

    /// Arrivals handed out so far.
    pub fn handed_out(&self) -> u64 {
        self.lock().handed_out
    }

    pub fn remaining(&self) -> u64 {
        self.lock().remaining
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Remaining> {
        // The counters stay consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArrivalPackages for DynamicLoadBalancer {
    fn take_arrivals(&self) -> u64 {
        let mut state = self.lock();
        let package = if state.remaining > self.total / 4 { self.package_large } else { self.package_small };
        let package = package.min(state.remaining);
        state.remaining -= package;
        state.handed_out += package;
        package
    }
}

/// Spread of the arrivals simulated per thread: `(max - min) * threads /
/// sum`.  0 means a perfect split.
pub fn balance_info(arrivals: &[u64]) -> f64 {
    let sum: u64 = arrivals.iter().sum();
    if sum == 0 {
        return 0.0;
    }
    let (min, max) = arrivals
        .iter()
        .fold((u64::MAX, 0), |(min, max), &n| (min.min(n), max.max(n)));
    (max - min) as f64 * arrivals.len() as f64 / sum as f64
}
