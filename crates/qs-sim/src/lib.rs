//! `qs-sim`: multi-thread runner for the rust_qs queueing simulator.
//!
//! # Work split
//!
//! ```text
//! repeat_count == 1   every thread runs one day with 1/threads of the
//!                     arrivals, or takes packages from the load balancer
//! repeat_count  > 1   days are dealt out to threads; with too few days
//!                     every day is halved until all threads have work
//! ```
//!
//! After the workers join, their statistics are merged into one
//! [`Statistics`](qs_stats::Statistics) value.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                 |
//! |------------|--------------------------------------------------------|
//! | `parallel` | Runs the workers on Rayon's thread pool.               |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use qs_core::SimConfig;
//! use qs_sim::{NoopObserver, SimBuilder};
//!
//! let mut sim = SimBuilder::new(SimConfig::default(), Arc::new(model)).build()?;
//! let stats = sim.run(&mut NoopObserver)?;
//! ```

pub mod balancer;
pub mod builder;
pub mod error;
pub mod observer;
pub mod sim;
pub mod split;


pub use balancer::{DynamicLoadBalancer, MIN_PACKAGE_SIZE, balance_info};
pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use observer::{DayReport, NoopObserver, SimObserver};
pub use sim::Simulator;
pub use split::{MIN_ARRIVALS_PER_THREAD, resolve_thread_count, thread_split};
