use thiserror::Error;

/// All errors produced by doa-core.
#[derive(Debug, Error)]
pub enum DoaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("kernel error: {0}")]
    Kernel(String),

    #[error("frame ring is full — dispatcher cannot keep up")]
    RingBufferFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DoaError>;
