//! Transporter type definitions as they come from the compiled model.

use std::sync::Arc;

use qs_core::{Expression, FailureSpec, StationId, TimeSource};

use crate::distance::DistanceMatrix;
use crate::error::{TransportError, TransportResult};

#[derive(Clone, Debug)]
pub struct TransporterTemplate {
    pub name:        String,
    /// Clients one transporter can carry at once.
    pub capacity:    u32,
    /// Travel time in seconds, evaluated over the model variables with the
    /// distance appended as the last variable.  `None` travels one distance
    /// unit per second.
    pub travel_time: Option<Arc<dyn Expression>>,
    pub load:        Option<TimeSource>,
    pub unload:      Option<TimeSource>,
    pub failures:    Vec<FailureSpec>,
    pub distances:   DistanceMatrix,
    /// Initial number of transporters per station.
    pub placement:   Vec<(StationId, u32)>,
}

impl TransporterTemplate {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            travel_time: None,
            load: None,
            unload: None,
            failures: Vec::new(),
            distances: DistanceMatrix::new(),
            placement: Vec::new(),
        }
    }

    pub fn with_travel_time(mut self, expr: Arc<dyn Expression>) -> Self {
        self.travel_time = Some(expr);
        self
    }

    pub fn with_load_times(mut self, load: Option<TimeSource>, unload: Option<TimeSource>) -> Self {
        self.load = load;
        self.unload = unload;
        self
    }

    pub fn with_failure(mut self, failure: FailureSpec) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_distance(mut self, from: StationId, to: StationId, distance: f64) -> Self {
        self.distances.set(from, to, distance);
        self
    }

    /// Park `count` more transporters at `station` at the start of a run.
    pub fn place(mut self, station: StationId, count: u32) -> Self {
        self.placement.push((station, count));
        self
    }

    /// Total fleet size.
    pub fn count(&self) -> u32 {
        self.placement.iter().map(|&(_, n)| n).sum()
    }

    /// `station_count` is the size of the model's station table.
    pub fn validate(&self, station_count: usize) -> TransportResult<()> {
        if self.name.trim().is_empty() {
            return Err(TransportError::EmptyName);
        }
        if self.capacity == 0 {
            return Err(TransportError::ZeroCapacity(self.name.clone()));
        }
        for &(station, _) in &self.placement {
            if station.index() >= station_count {
                return Err(TransportError::UnknownStation { name: self.name.clone(), station });
            }
        }
        for (from, to, d) in self.distances.iter() {
            if d < 0.0 {
                return Err(TransportError::NegativeDistance { name: self.name.clone(), from, to });
            }
        }
        Ok(())
    }
}

/// Validate every template and reject names that differ only in case.
pub fn validate_all(templates: &[TransporterTemplate], station_count: usize) -> TransportResult<()> {
    for (i, t) in templates.iter().enumerate() {
        t.validate(station_count)?;
        if templates[..i].iter().any(|o| o.name.eq_ignore_ascii_case(&t.name)) {
            return Err(TransportError::DuplicateName(t.name.clone()));
        }
    }
    Ok(())
}
