//! `qs-resource`: resource groups and their operators.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                        |
//! |--------------|-----------------------------------------------------------------|
//! | [`template`] | `ResourceTemplate`, `Capacity`, `ResourceCosts`, `SetupTime`    |
//! | [`schedule`] | `Schedule` trait, `SlotSchedule`, `RepeatMode`                  |
//! | [`operator`] | `Operator` state machine (Idle / Working / Paused)               |
//! | [`group`]    | `ResourceGroup` (allocate, release, resize, costs, statistics)  |
//! | [`set`]      | `ResourceSet`, `ResourceDemand`, `SecondaryPriority`            |
//! | [`error`]    | `ResourceError`, `ResourceResult<T>`                            |
//!
//! # Allocation protocol
//!
//! A station first asks [`ResourceSet::try_lock`], which tests every group
//! of the demand and only then allocates from all of them.  A group is
//! never asked to allocate more than its last `can_allocate` admitted, so
//! `in_use` never exceeds the available count.  Release bookkeeping is
//! finished before the runtime starts the released-resources round.

pub mod error;
pub mod group;
pub mod operator;
pub mod schedule;
pub mod set;
pub mod template;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{ResourceError, ResourceResult};
pub use group::{ResourceCheck, ResourceGroup};
pub use operator::{Operator, OperatorState, Transition};
pub use schedule::{RepeatMode, Schedule, SlotSchedule};
pub use set::{ResourceDemand, ResourceSet, SecondaryPriority};
pub use template::{Capacity, ResourceCosts, ResourceTemplate, SetupTime, validate_all};
