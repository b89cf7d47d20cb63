use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("container too short: need at least {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },
    #[error("chunk offset {offset} for chunk {index} is out of bounds ({total} byte container)")]
    BadChunkOffset {
        index: usize,
        offset: u32,
        total: usize,
    },
    #[error("chunk {index} header claims {claimed} bytes but only {available} remain")]
    ChunkBodyTruncated {
        index: usize,
        claimed: u32,
        available: usize,
    },
}
