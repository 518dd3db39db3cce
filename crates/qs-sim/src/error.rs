use qs_run::RunError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error("worker thread {0} panicked")]
    ThreadPanicked(usize),

    #[error("model error: {0}")]
    Run(#[from] RunError),
}

pub type SimResult<T> = Result<T, SimError>;
