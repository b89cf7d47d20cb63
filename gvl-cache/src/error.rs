use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read/write the on-disk cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode the on-disk cache: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode the on-disk cache: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
