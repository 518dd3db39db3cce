//! Performance indicators.
//!
//! | Type             | Records                                              |
//! |------------------|------------------------------------------------------|
//! | `TimeIndicator`  | an integer state over time (queue length, in use)    |
//! | `DataIndicator`  | individual observations (waiting times), batch means |
//! | `CountIndicator` | how often something happened (paths, transitions)    |
//! | `ValueIndicator` | an accumulated amount (costs)                        |
//!
//! All indicators can be reset (warm-up end), merged (combining threads and
//! replications), and closed for one replication with `finish_run`, which
//! feeds the between-replication confidence estimate.

use crate::quantile::half_width;

/// Common operations every indicator supports.
pub trait Indicator: Clone {
    /// Discard all recorded data.
    fn reset(&mut self);

    /// Add the data of `other` to `self`.
    fn merge(&mut self, other: &Self);

    /// Close the current replication.
    fn finish_run(&mut self) {}
}

// ── TimeIndicator ─────────────────────────────────────────────────────────────

/// Largest state tracked individually in the per-state histogram.
pub const MAX_STATE: u32 = 2048 * 1024;

/// Time-weighted integer state.
///
/// The indicator holds the current state and the time it was entered.  Every
/// [`set`](Self::set) credits the elapsed interval to the previous state.
/// Times are in seconds.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeIndicator {
    last_time:  f64,
    last_state: u32,
    state_time: Vec<f64>,
    min:        Option<u32>,
    max:        Option<u32>,
    sum:        f64,
    value_sum:  f64,
    value_sum2: f64,
    run_count:  u64,
    run_sum:    f64,
    run_sum2:   f64,
}

impl TimeIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `state` at `time`.  Earlier times than the last recorded one
    /// only change the state.
    pub fn set(&mut self, time: f64, state: u32) {
        if time > self.last_time {
            let add = time - self.last_time;
            let s = self.last_state;
            let slot = s.min(MAX_STATE) as usize;
            if self.state_time.len() <= slot {
                self.state_time.resize(slot + 1, 0.0);
            }
            self.state_time[slot] += add;
            self.min = Some(self.min.map_or(s, |m| m.min(s)));
            self.max = Some(self.max.map_or(s, |m| m.max(s)));
            self.sum += add;
            self.value_sum += add * s as f64;
            self.value_sum2 += add * (s as f64) * (s as f64);
            self.last_time = time;
        }
        self.last_state = state;
    }

    /// Credit the interval up to `time` to the current state.
    pub fn close(&mut self, time: f64) {
        self.set(time, self.last_state);
    }

    /// Restart recording at `time` without crediting the interval before it.
    pub fn anchor(&mut self, time: f64) {
        self.last_time = time;
    }

    /// Discard all data but keep the current state, recording from `time` on.
    pub fn restart_at(&mut self, time: f64) {
        let state = self.last_state;
        self.reset();
        self.last_state = state;
        self.last_time = time;
    }

    #[inline]
    pub fn current(&self) -> u32 {
        self.last_state
    }

    /// Total observed duration in seconds.
    pub fn time_sum(&self) -> f64 {
        self.sum
    }

    pub fn time_mean(&self) -> f64 {
        if self.sum > 0.0 { self.value_sum / self.sum } else { 0.0 }
    }

    pub fn time_sd(&self) -> f64 {
        if self.sum <= 0.0 {
            return 0.0;
        }
        let mean = self.time_mean();
        (self.value_sum2 / self.sum - mean * mean).max(0.0).sqrt()
    }

    pub fn min(&self) -> u32 {
        self.min.unwrap_or(0)
    }

    pub fn max(&self) -> u32 {
        self.max.unwrap_or(0)
    }

    /// Share of the observed time spent in `state`.
    pub fn part_for_state(&self, state: u32) -> f64 {
        if self.sum <= 0.0 {
            return 0.0;
        }
        self.state_time.get(state as usize).map_or(0.0, |t| t / self.sum)
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Confidence half-width of the replication means at level `1 - alpha`.
    pub fn run_half_width(&self, alpha: f64) -> f64 {
        run_half_width(alpha, self.run_count, self.run_sum, self.run_sum2)
    }
}

impl Indicator for TimeIndicator {
    fn reset(&mut self) {
        *self = TimeIndicator::default();
    }

    fn merge(&mut self, other: &Self) {
        if self.state_time.len() < other.state_time.len() {
            self.state_time.resize(other.state_time.len(), 0.0);
        }
        for (mine, theirs) in self.state_time.iter_mut().zip(&other.state_time) {
            *mine += theirs;
        }
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.value_sum += other.value_sum;
        self.value_sum2 += other.value_sum2;
        self.run_count += other.run_count;
        self.run_sum += other.run_sum;
        self.run_sum2 += other.run_sum2;
    }

    fn finish_run(&mut self) {
        let mean = self.time_mean();
        self.run_count += 1;
        self.run_sum += mean;
        self.run_sum2 += mean * mean;
    }
}

// ── DataIndicator ─────────────────────────────────────────────────────────────

/// Individual observations with optional batch means.
///
/// With a batch size above 1 every `batch_size` consecutive values form one
/// batch mean.  The spread of the batch means gives the confidence half-width
/// used by confidence-based termination.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataIndicator {
    count:            u64,
    sum:              f64,
    sum2:             f64,
    min:              f64,
    max:              f64,
    batch_size:       u32,
    batch_temp_sum:   f64,
    batch_temp_count: u32,
    batch_count:      u64,
    batch_sum:        f64,
    batch_sum2:       f64,
    run_count:        u64,
    run_sum:          f64,
    run_sum2:         f64,
}

impl DataIndicator {
    /// `batch_size <= 1` disables batch means.
    pub fn new(batch_size: u32) -> Self {
        Self { batch_size, ..Self::default() }
    }

    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum2 += value * value;

        if self.batch_size > 1 {
            self.batch_temp_sum += value;
            self.batch_temp_count += 1;
            if self.batch_temp_count == self.batch_size {
                let b = self.batch_temp_sum / self.batch_size as f64;
                self.batch_count += 1;
                self.batch_sum += b;
                self.batch_sum2 += b * b;
                self.batch_temp_sum = 0.0;
                self.batch_temp_count = 0;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0 { self.sum / self.count as f64 } else { 0.0 }
    }

    /// Sample variance.
    pub fn var(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        ((self.sum2 - self.sum * self.sum / n) / (n - 1.0)).max(0.0)
    }

    pub fn sd(&self) -> f64 {
        self.var().sqrt()
    }

    pub fn cv(&self) -> f64 {
        let mean = self.mean();
        if mean > 0.0 { self.sd() / mean } else { 0.0 }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    /// Standard deviation of the grand mean estimated from the batch means
    /// (already divided by `sqrt(batch_count)`).
    pub fn batch_sd(&self) -> f64 {
        let b = self.batch_count;
        if b < 2 {
            return 0.0;
        }
        let bf = b as f64;
        let m = self.mean();
        let var = (self.batch_sum2 - 2.0 * m * self.batch_sum + bf * m * m) / bf / (bf - 1.0);
        var.max(0.0).sqrt()
    }

    /// Batch-means confidence half-width at level `1 - alpha`.
    pub fn batch_half_width(&self, alpha: f64) -> f64 {
        if self.min == self.max {
            return 0.0;
        }
        half_width(alpha, self.batch_count, self.batch_sd())
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn run_half_width(&self, alpha: f64) -> f64 {
        run_half_width(alpha, self.run_count, self.run_sum, self.run_sum2)
    }
}

impl Indicator for DataIndicator {
    fn reset(&mut self) {
        *self = DataIndicator::new(self.batch_size);
    }

    fn merge(&mut self, other: &Self) {
        if other.count > 0 {
            if self.count == 0 {
                self.min = other.min;
                self.max = other.max;
            } else {
                self.min = self.min.min(other.min);
                self.max = self.max.max(other.max);
            }
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum2 += other.sum2;
        if other.batch_size > 1 {
            self.batch_size = other.batch_size;
            self.batch_count += other.batch_count;
            self.batch_sum += other.batch_sum;
            self.batch_sum2 += other.batch_sum2;
        }
        self.run_count += other.run_count;
        self.run_sum += other.run_sum;
        self.run_sum2 += other.run_sum2;
    }

    fn finish_run(&mut self) {
        let mean = self.mean();
        self.run_count += 1;
        self.run_sum += mean;
        self.run_sum2 += mean * mean;
    }
}

// ── CountIndicator / ValueIndicator ───────────────────────────────────────────

/// Occurrence counter.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountIndicator {
    count: u64,
}

impl CountIndicator {
    #[inline]
    pub fn add(&mut self) {
        self.count += 1;
    }

    #[inline]
    pub fn add_n(&mut self, n: u64) {
        self.count += n;
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Indicator for CountIndicator {
    fn reset(&mut self) {
        self.count = 0;
    }

    fn merge(&mut self, other: &Self) {
        self.count += other.count;
    }
}

/// Accumulated amount.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueIndicator {
    value: f64,
    count: u64,
}

impl ValueIndicator {
    #[inline]
    pub fn add(&mut self, value: f64) {
        self.value += value;
        self.count += 1;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Indicator for ValueIndicator {
    fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
    }

    fn merge(&mut self, other: &Self) {
        self.value += other.value;
        self.count += other.count;
    }
}

fn run_half_width(alpha: f64, b: u64, sum: f64, sum2: f64) -> f64 {
    if b < 2 {
        return 0.0;
    }
    let bf = b as f64;
    let m = sum / bf;
    let var = (sum2 - 2.0 * m * sum + bf * m * m) / bf / (bf - 1.0);
    half_width(alpha, b, var.max(0.0).sqrt())
}
