//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `QsError` where they need
//! to surface a core failure.

use thiserror::Error;

use crate::{ClientTypeId, ResourceId, StationId, TransporterTypeId};

/// The top-level error type for `qs-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum QsError {
    #[error("station {0} not found")]
    StationNotFound(StationId),

    #[error("client type {0} not found")]
    ClientTypeNotFound(ClientTypeId),

    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    #[error("transporter type {0} not found")]
    TransporterTypeNotFound(TransporterTypeId),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Shorthand result type for core operations.
pub type QsResult<T> = Result<T, QsError>;
