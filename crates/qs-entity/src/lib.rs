//! `qs-entity`: clients and the client pool.
//!
//! | Module     | Contents                                                      |
//! |------------|---------------------------------------------------------------|
//! | [`client`] | `Client`, `ClientType`, `ClientTimes`, batches, user data, sections, logic stack, path |
//! | [`pool`]   | `ClientPool` (bounded free list, in-system counts, client statistics) |
//! | [`error`]  | `EntityError`, `EntityResult`                                 |

pub mod client;
pub mod error;
pub mod pool;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use client::{Client, ClientTimes, ClientType, MAX_USER_DATA_INDEX, SectionEntry};
pub use error::{EntityError, EntityResult};
pub use pool::{
    CLIENT_CACHE_SIZE, CONFIDENCE_TEST_INTERVAL, ClientPool, ClientRecording, MAX_CLIENTS_ANIMATION,
    MAX_CLIENTS_MULTI_CORE, MAX_CLIENTS_SINGLE_CORE, client_ceiling,
};
