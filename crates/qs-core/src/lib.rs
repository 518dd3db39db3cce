//! `qs-core`: foundational types for the `rust_qs` queueing-network simulator.
//!
//! This crate is a dependency of every other `qs-*` crate.  It has no `qs-*`
//! dependencies and minimal external ones (`rand` and `thiserror`, plus
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                      |
//! |-------------|---------------------------------------------------------------|
//! | [`ids`]     | `StationId`, `ClientTypeId`, `ResourceId`, `TransporterTypeId` |
//! | [`time`]    | `SimTime` (milliseconds), `TimeBase`, `SimConfig`             |
//! | [`rng`]     | `SimRng` (per-thread, seeded deterministically)               |
//! | [`expr`]    | `Expression`, `Distribution`, `TimeSource`, `EvalCtx`         |
//! | [`failure`] | `FailureSpec`, `FailureTrigger`, `FailureClock`               |
//! | [`error`]   | `QsError`, `QsResult`                                         |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                        |
//! |---------|---------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to ids, `SimTime`, `SimConfig`. |

pub mod error;
pub mod expr;
pub mod failure;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{QsError, QsResult};
pub use expr::{
    CalcError, CalcFailure, CalcOrigin, Constant, Deterministic, Distribution, EvalCtx,
    Exponential, Expression, FnExpression, TimeSource, Uniform, Variable,
};
pub use failure::{FailureClock, FailureSpec, FailureTrigger};
pub use ids::{ClientTypeId, ResourceId, StationId, TransporterTypeId};
pub use rng::SimRng;
pub use time::{SimConfig, SimTime, TimeBase};
