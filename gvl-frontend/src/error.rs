use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Container(#[from] gvl_container::ContainerError),
    #[error(transparent)]
    Bitstream(#[from] gvl_bitstream::BitstreamError),
    #[error("module chunk missing required sub-chunk {0:?}")]
    MissingChunk(gvl_container::ChunkTag),
    #[error("record in block {block_id} carries an opcode the lifter does not recognize: {code}")]
    UnknownRecordShape { block_id: u32, code: u64 },
    #[error("function block references undeclared basic block {0}")]
    DanglingBlockReference(u32),
}

pub type Result<T> = std::result::Result<T, FrontendError>;
