use thiserror::Error;

/// Errors the back-end (C6) can report. Every variant here corresponds to
/// one of §7's recoverable kinds -- the caller (`gvl-layer`) is expected to
/// fall back to passthrough bytecode rather than propagate these out of the
/// shader-create entry point.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Container(#[from] gvl_container::ContainerError),
    #[error(transparent)]
    Bitstream(#[from] gvl_bitstream::BitstreamError),
    #[error(transparent)]
    Frontend(#[from] gvl_frontend::FrontendError),
    #[error("container is missing the bitstream module chunk")]
    MissingModuleChunk,
    #[error("emitted bytecode did not re-scan to the same IL tree")]
    RoundTripValidation,
}

pub type Result<T> = std::result::Result<T, BackendError>;
