//! `qs-run`: the per-thread runtime of the rust_qs simulator.
//!
//! One worker thread owns one [`SimulationData`] and runs its share of the
//! replications on it.  Stations are shared, immutable [`Station`] trait
//! objects; all mutable state of a replication lives in [`RunData`].
//!
//! # Crate layout
//!
//! | Module       | Contents                                                          |
//! |--------------|-------------------------------------------------------------------|
//! | [`model`]    | `RunModel`, `Termination`, `WarmUp`, `Recording`                  |
//! | [`station`]  | `Station` trait, `Interests`                                      |
//! | [`event`]    | `Event`, `FnEvent`, `EventQueue`                                  |
//! | [`run_data`] | `RunData`, `ThreadSetup`, `ThreadSplit`, `ArrivalPackages`        |
//! | [`sim_data`] | `SimulationData`: replication lifecycle, clients, calc errors     |
//! | `notify`     | notification rounds (state change, resources, transporters, moves) |
//! | `facade`     | resource and transporter operations for stations                  |
//! | [`error`]    | `RunError`, `RunResult<T>`                                        |
//!
//! # One event, start to end
//!
//! ```text
//! EventQueue::pop ──▶ Event::run(&mut SimulationData)
//!                       ├─ station hooks (arrival, state_change, ...)
//!                       ├─ facade calls ──▶ subsystem checks drained into events
//!                       └─ notification rounds
//!                     check_calc_errors ──▶ warn, or emergency shutdown
//! ```

pub mod error;
pub mod event;
pub mod model;
pub mod run_data;
pub mod sim_data;
pub mod station;

mod facade;
mod notify;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{RunError, RunResult};
pub use event::{Event, EventQueue, FnEvent};
pub use model::{ConfidenceRule, Recording, RunModel, Termination, WarmUp};
pub use run_data::{ArrivalPackages, ListenerKind, RunData, ThreadSetup, ThreadSplit};
pub use sim_data::SimulationData;
pub use station::{Interests, Station};
