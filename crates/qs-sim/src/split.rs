//! Dividing replications and arrivals between worker threads.

use qs_run::{RunModel, ThreadSplit};

/// Fewest arrivals worth a thread of their own.
pub const MIN_ARRIVALS_PER_THREAD: u64 = 200;

/// The share of thread `thread_nr` out of `threads`.
///
/// A single replication is split by arrivals: every thread runs one day
/// with `1 / threads` of the clients.  Several replications are split by
/// days.  If splitting is allowed and there are fewer replications than
/// threads, every replication is halved (twice the days, half the clients
/// each) until all threads have work.
pub fn thread_split(thread_nr: usize, threads: usize, repeat_count: u64, allow_split: bool) -> ThreadSplit {
    let threads = threads.max(1) as u64;
    let nr = thread_nr as u64;

    if repeat_count <= 1 {
        return ThreadSplit { sim_days: 1, days_by_other_threads: nr, client_count_div: threads };
    }

    let mut repeat = repeat_count;
    let mut div = 1;
    if allow_split {
        while repeat < threads {
            repeat *= 2;
            div *= 2;
        }
    }

    let base = repeat / threads;
    let add = repeat % threads;
    let (sim_days, days_by_other_threads) = if nr < add {
        (base + 1, nr * (base + 1))
    } else {
        (base, add * (base + 1) + (nr - add) * base)
    };
    ThreadSplit { sim_days, days_by_other_threads, client_count_div: div }
}

/// The number of worker threads worth starting for `model` when `wanted`
/// are available.
///
/// Small client counts stay on fewer threads, and runs that cannot be split
/// by arrivals get at most one thread per replication.
pub fn resolve_thread_count(wanted: usize, model: &RunModel) -> usize {
    let mut threads = wanted.max(1) as u64;
    let count = model.termination.client_count;
    let repeat = model.repeat_count.max(1);

    if count > 0 {
        threads = threads.min((count / MIN_ARRIVALS_PER_THREAD).max(1));
        if repeat > 1 && !model.repeat_allow_split {
            threads = threads.min(repeat);
        }
    } else {
        threads = threads.min(repeat);
    }
    usize::try_from(threads).unwrap_or(1)
}

/// Whether replications may be halved: only when the model allows it and
/// the run is bounded by a client count.
pub fn split_allowed(model: &RunModel) -> bool {
    model.repeat_allow_split && model.termination.client_count > 0
}
