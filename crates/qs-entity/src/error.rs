use thiserror::Error;

use qs_core::ClientTypeId;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("too many clients in the system (limit {ceiling})")]
    CeilingExceeded { ceiling: u64 },

    #[error("client type {0} not found")]
    UnknownClientType(ClientTypeId),
}

pub type EntityResult<T> = Result<T, EntityError>;
