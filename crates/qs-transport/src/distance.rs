//! Sparse, directed distance matrix of one transporter type.

use qs_core::StationId;
use rustc_hash::FxHashMap;

/// Distances between transporter stations.  Pairs that were never set, and
/// moves from a station to itself, have distance 0.
#[derive(Clone, Debug, Default)]
pub struct DistanceMatrix {
    entries: FxHashMap<(StationId, StationId), f64>,
}

impl DistanceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the distance from `from` to `to`.  Zero distances and self-loops
    /// are not stored.
    pub fn set(&mut self, from: StationId, to: StationId, distance: f64) {
        if from == to || distance == 0.0 {
            self.entries.remove(&(from, to));
            return;
        }
        self.entries.insert((from, to), distance);
    }

    /// Set the same distance in both directions.
    pub fn set_symmetric(&mut self, a: StationId, b: StationId, distance: f64) {
        self.set(a, b, distance);
        self.set(b, a, distance);
    }

    #[inline]
    pub fn get(&self, from: StationId, to: StationId) -> f64 {
        self.entries.get(&(from, to)).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored `(from, to, distance)` triples, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (StationId, StationId, f64)> + '_ {
        self.entries.iter().map(|(&(a, b), &d)| (a, b, d))
    }
}
