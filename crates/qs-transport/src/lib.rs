//! `qs-transport`: transporter fleets moving clients between stations.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                      |
//! |-----------------|---------------------------------------------------------------|
//! | [`template`]    | `TransporterTemplate` (capacity, travel time, placement)      |
//! | [`distance`]    | `DistanceMatrix` (sparse, directed)                           |
//! | [`transporter`] | `Transporter`, `TransporterRef`                               |
//! | [`system`]      | `TransporterSystem`, `MoveOutcome`, `FreeOutcome`, `TransportCheck` |
//! | [`error`]       | `TransportError`, `TransportResult<T>`                        |
//!
//! # Life of a transporter
//!
//! ```text
//!   parked ──move_to──▶ in transfer ──arrival──▶ parked ──free──▶ waiting
//!                                                         │
//!                                          trigger due    ▼
//!                                                   paused ──pause_end──▶ waiting
//! ```
//!
//! Station notifications belong to the runtime: this crate only reports what
//! happened (`MoveOutcome`, `FreeOutcome`) and which follow-up checks are due.

pub mod distance;
pub mod error;
pub mod system;
pub mod template;
pub mod transporter;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use distance::DistanceMatrix;
pub use error::{TransportError, TransportResult};
pub use system::{FreeOutcome, MoveOutcome, TransportCheck, TransporterSystem};
pub use template::{TransporterTemplate, validate_all};
pub use transporter::{Transporter, TransporterRef};
