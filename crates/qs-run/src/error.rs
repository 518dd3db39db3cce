use qs_core::StationId;
use qs_entity::EntityError;
use qs_output::OutputError;
use qs_resource::ResourceError;
use qs_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("model error: {0}")]
    Model(String),

    #[error("station {0} not found")]
    UnknownStation(StationId),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("transporter error: {0}")]
    Transport(#[from] TransportError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),

    #[error("client error: {0}")]
    Entity(#[from] EntityError),
}

pub type RunResult<T> = Result<T, RunError>;
