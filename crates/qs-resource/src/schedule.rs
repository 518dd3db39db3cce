//! Time-varying resource availability.
//!
//! # Slot model
//!
//! A [`SlotSchedule`] divides time into slots of `slot_secs` seconds.  At
//! model time `t` (seconds) the active slot is
//!
//! ```text
//! slot = t / slot_secs
//! ```
//!
//! and the number of available operators is `slots[slot]`.  Past the end of
//! the slot list the [`RepeatMode`] decides what happens.

use std::fmt;

/// Availability over model time.  Implementations must be cheap to query;
/// the resource layer asks on every allocation test.
pub trait Schedule: Send + Sync + fmt::Debug {
    /// Operators available at `secs` seconds of model time.
    fn value_at(&self, secs: u64) -> u32;

    /// Length of one slot in seconds.  Availability only changes at slot
    /// boundaries, which is when waiting clients are re-tested.
    fn slot_secs(&self) -> u64;

    /// Largest value the schedule can take.
    fn max_value(&self) -> u32;

    /// Operator-hours available between `from_secs` and `to_secs`.
    fn available_hours(&self, from_secs: u64, to_secs: u64) -> f64 {
        let slot = self.slot_secs().max(1);
        let (first, last) = (from_secs / slot, to_secs / slot);
        let mut sum = 0.0;
        for nr in first..=last {
            let start = (nr * slot).max(from_secs);
            let end = ((nr + 1) * slot).min(to_secs);
            if end > start {
                sum += self.value_at(nr * slot) as f64 * (end - start) as f64 / 3_600.0;
            }
        }
        sum
    }
}

/// What a [`SlotSchedule`] does after its last slot.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum RepeatMode {
    /// Start over with the first slot.
    Repeat,
    /// Pad the slot list with zeros to whole days, then repeat.
    #[default]
    RepeatFillDay,
    /// Keep the last slot's value forever.
    StayAtLast,
    /// No operators after the last slot.
    Zero,
}

#[derive(Clone, Debug)]
pub struct SlotSchedule {
    pub name:   String,
    slots:      Vec<u32>,
    slot_secs:  u64,
    repeat:     RepeatMode,
    /// Length of the repeat cycle in slots (padded for `RepeatFillDay`).
    cycle_len:  usize,
}

impl SlotSchedule {
    /// `slot_secs` of zero is treated as one second.
    pub fn new(name: impl Into<String>, slots: Vec<u32>, slot_secs: u64, repeat: RepeatMode) -> Self {
        let slot_secs = slot_secs.max(1);
        let cycle_len = match repeat {
            RepeatMode::RepeatFillDay => {
                let per_day = (86_400 / slot_secs).max(1) as usize;
                slots.len().div_ceil(per_day) * per_day
            }
            _ => slots.len(),
        };
        Self { name: name.into(), slots, slot_secs, repeat, cycle_len }
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn value_of_slot(&self, nr: u64) -> u32 {
        if self.slots.is_empty() {
            return 0;
        }
        if let Some(&v) = self.slots.get(nr as usize) {
            return v;
        }
        match self.repeat {
            RepeatMode::Repeat | RepeatMode::RepeatFillDay => {
                let i = (nr % self.cycle_len as u64) as usize;
                self.slots.get(i).copied().unwrap_or(0)
            }
            RepeatMode::StayAtLast => self.slots.last().copied().unwrap_or(0),
            RepeatMode::Zero => 0,
        }
    }
}

impl Schedule for SlotSchedule {
    fn value_at(&self, secs: u64) -> u32 {
        self.value_of_slot(secs / self.slot_secs)
    }

    fn slot_secs(&self) -> u64 {
        self.slot_secs
    }

    fn max_value(&self) -> u32 {
        self.slots.iter().copied().max().unwrap_or(0)
    }
}
