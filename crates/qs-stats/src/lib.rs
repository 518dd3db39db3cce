//! `qs-stats`: performance indicators and run statistics.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                        |
//! |----------------|-----------------------------------------------------------------|
//! | [`indicator`]  | `TimeIndicator`, `DataIndicator`, `CountIndicator`, `ValueIndicator` |
//! | [`registry`]   | `Registry<I>`, `IndicatorHandle`, `IndicatorCache` (by index)   |
//! | [`statistics`] | `Statistics` (everything one run records)                       |
//! | [`quantile`]   | normal and Student t quantiles for confidence half-widths       |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                    |
//! |---------|-----------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on indicators and `Statistics`. |
//!
//! Indicators are infallible: invalid inputs (e.g. a state set for an earlier
//! time) are absorbed instead of reported.

pub mod indicator;
pub mod quantile;
pub mod registry;
pub mod statistics;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use indicator::{CountIndicator, DataIndicator, Indicator, TimeIndicator, ValueIndicator};
pub use quantile::{normal_quantile, t_quantile};
pub use registry::{IndicatorCache, IndicatorHandle, Registry};
pub use statistics::Statistics;
