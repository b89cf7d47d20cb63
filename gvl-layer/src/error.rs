use thiserror::Error;

/// Errors surfaced at the layer boundary (`gvl-layer`'s own glue, on top of
/// the per-component errors each crate already reports). Per §7 these are
/// all either recoverable locally or represent a caller mistake at the
/// dispatch-table boundary (looking up a device that was never registered,
/// or was already torn down).
#[derive(Debug, Error)]
pub enum LayerError {
    #[error(transparent)]
    Core(#[from] gvl_core::Error),
    #[error(transparent)]
    Descriptor(#[from] gvl_descriptor::DescriptorError),
    #[error("no device registered for dispatch key {0:#x}")]
    UnknownDevice(usize),
}

pub type Result<T> = std::result::Result<T, LayerError>;
