//! The compiled, read-only model shared by all worker threads.
//!
//! A `RunModel` is built once, wrapped in an `Arc` and never mutated after
//! it is handed to the simulator.  Everything a thread changes lives in its
//! own [`RunData`](crate::RunData).

use std::fmt;
use std::sync::Arc;

use qs_core::{Expression, SimTime, StationId};
use qs_entity::{ClientRecording, ClientType};
use qs_resource::{ResourceTemplate, SecondaryPriority};
use qs_transport::TransporterTemplate;

use crate::error::{RunError, RunResult};
use crate::station::Station;

// ── Termination / warm-up ─────────────────────────────────────────────────────

/// Stop once the batch-means half-width of all waiting times drops to
/// `half_width` at confidence level `1 - alpha`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConfidenceRule {
    pub half_width: f64,
    pub alpha:      f64,
}

/// When a replication ends.  Every rule that is set applies.
#[derive(Clone, Debug, Default)]
pub struct Termination {
    /// Arrivals to simulate over all threads.  `0` means no limit.
    pub client_count: u64,
    /// Model time in seconds after which the run stops.
    pub time_secs:    Option<f64>,
    /// Stop as soon as this evaluates to a non-zero value.
    pub condition:    Option<Arc<dyn Expression>>,
    pub confidence:   Option<ConfidenceRule>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum WarmUp {
    #[default]
    None,
    /// Arrivals (before the per-thread split) that belong to the warm-up.
    Arrivals(u64),
    /// The warm-up ends at this model time.
    Time(SimTime),
}

impl WarmUp {
    pub fn is_active(&self) -> bool {
        match *self {
            WarmUp::None => false,
            WarmUp::Arrivals(n) => n > 0,
            WarmUp::Time(t) => !t.is_zero(),
        }
    }
}

/// What is recorded about moving clients.
#[derive(Copy, Clone, Debug, Default)]
pub struct Recording {
    pub paths:          bool,
    pub station_totals: bool,
    pub transitions:    bool,
}

impl Recording {
    pub fn clients(&self) -> ClientRecording {
        ClientRecording { paths: self.paths, station_totals: self.station_totals }
    }
}

// ── RunModel ──────────────────────────────────────────────────────────────────

pub struct RunModel {
    /// Index = `StationId`.
    pub stations:           Vec<Arc<dyn Station>>,
    pub station_names:      Arc<[String]>,
    pub client_types:       Arc<[ClientType]>,
    pub variable_names:     Vec<String>,
    /// Initial value per variable; `None` starts at zero.
    pub variable_initial:   Vec<Option<Arc<dyn Expression>>>,
    pub resources:          Vec<ResourceTemplate>,
    pub secondary_priority: SecondaryPriority,
    pub transporters:       Vec<TransporterTemplate>,
    pub termination:        Termination,
    pub warm_up:            WarmUp,
    /// Independent replications.
    pub repeat_count:       u64,
    /// Allow splitting replications so that every thread gets work.
    pub repeat_allow_split: bool,
    pub stop_on_calc_error: bool,
    pub recording:          Recording,
    /// Batch-means batch size of the waiting-time indicators (0 = off).
    pub batch_size:         u32,
    /// Overrides the live-client ceiling.
    pub client_ceiling:     Option<u64>,
    /// Interval of timed station checks in ms (0 = off).
    pub timed_checks_ms:    u64,
}

impl fmt::Debug for RunModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunModel")
            .field("stations", &self.station_names)
            .field("client_types", &self.client_types.len())
            .field("variables", &self.variable_names)
            .field("resources", &self.resources.len())
            .field("transporters", &self.transporters.len())
            .field("termination", &self.termination)
            .field("warm_up", &self.warm_up)
            .field("repeat_count", &self.repeat_count)
            .finish_non_exhaustive()
    }
}

impl RunModel {
    /// A model with the given stations and client types and default settings
    /// for everything else.
    pub fn new(stations: Vec<Arc<dyn Station>>, client_types: Vec<ClientType>) -> Self {
        let station_names: Arc<[String]> = stations.iter().map(|s| s.name().to_owned()).collect();
        Self {
            stations,
            station_names,
            client_types: client_types.into(),
            variable_names: Vec::new(),
            variable_initial: Vec::new(),
            resources: Vec::new(),
            secondary_priority: SecondaryPriority::default(),
            transporters: Vec::new(),
            termination: Termination::default(),
            warm_up: WarmUp::None,
            repeat_count: 1,
            repeat_allow_split: true,
            stop_on_calc_error: false,
            recording: Recording::default(),
            batch_size: 0,
            client_ceiling: None,
            timed_checks_ms: 0,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, initial: Option<Arc<dyn Expression>>) -> Self {
        self.variable_names.push(name.into());
        self.variable_initial.push(initial);
        self
    }

    pub fn with_resource(mut self, template: ResourceTemplate) -> Self {
        self.resources.push(template);
        self
    }

    pub fn with_transporter(mut self, template: TransporterTemplate) -> Self {
        self.transporters.push(template);
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_warm_up(mut self, warm_up: WarmUp) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn with_repeat_count(mut self, repeat_count: u64) -> Self {
        self.repeat_count = repeat_count.max(1);
        self
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn station(&self, id: StationId) -> Option<&Arc<dyn Station>> {
        self.stations.get(id.index())
    }

    pub fn station_name(&self, id: StationId) -> &str {
        self.station_names.get(id.index()).map_or("", String::as_str)
    }

    /// Case-insensitive lookup.
    pub fn station_id(&self, name: &str) -> Option<StationId> {
        self.station_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| StationId(i as u32))
    }

    /// Length of the variable vector: model variables plus the three client
    /// slots (waiting, transfer, process seconds).
    pub fn variable_slots(&self) -> usize {
        self.variable_names.len() + 3
    }

    /// Check everything that can be checked without running.
    pub fn validate(&self) -> RunResult<()> {
        if self.stations.is_empty() {
            return Err(RunError::Model("the model has no stations".into()));
        }
        if self.client_types.is_empty() {
            return Err(RunError::Model("the model has no client types".into()));
        }
        if self.variable_initial.len() != self.variable_names.len() {
            return Err(RunError::Model(format!(
                "{} variables but {} initial values",
                self.variable_names.len(),
                self.variable_initial.len()
            )));
        }
        if let Some(rule) = &self.termination.confidence
            && !(rule.half_width > 0.0 && rule.alpha > 0.0 && rule.alpha < 1.0)
        {
            return Err(RunError::Model(format!("invalid confidence rule {rule:?}")));
        }
        qs_resource::validate_all(&self.resources)?;
        qs_transport::validate_all(&self.transporters, self.stations.len())?;
        Ok(())
    }
}
