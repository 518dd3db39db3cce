use qs_core::{StationId, TransporterTypeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transporter name must not be empty")]
    EmptyName,

    #[error("transporter type \"{0}\" is defined more than once")]
    DuplicateName(String),

    #[error("transporter type \"{0}\" has a capacity of zero")]
    ZeroCapacity(String),

    #[error("transporter type \"{name}\" is placed at unknown station {station}")]
    UnknownStation { name: String, station: StationId },

    #[error("transporter type \"{name}\" has a negative distance from {from} to {to}")]
    NegativeDistance { name: String, from: StationId, to: StationId },

    #[error("unknown transporter type \"{0}\"")]
    UnknownType(String),

    #[error("no transporter {index} of type {ty}")]
    UnknownTransporter { ty: TransporterTypeId, index: usize },
}

pub type TransportResult<T> = Result<T, TransportError>;
