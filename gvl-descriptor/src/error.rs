use thiserror::Error;

/// Errors the descriptor model (C7) can report. Per §7 these are all
/// "unknown descriptor operation" cases: recoverable at the layer boundary,
/// never propagated past the update call that triggered them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("update touches descriptor sets {0:?} and {1:?} in one call; only single-set updates are supported")]
    MixedSetUpdate(SetId, SetId),
    #[error("descriptor binding {binding} on set {set:?} has no matching layout entry")]
    UnknownBinding { set: SetId, binding: u32 },
    #[error("unsupported descriptor type for binding {binding} on set {set:?}")]
    UnsupportedDescriptorType { set: SetId, binding: u32 },
    #[error("descriptor set {0:?} has not been allocated in this pool")]
    SetNotAllocated(SetId),
}

pub type Result<T> = std::result::Result<T, DescriptorError>;

use crate::set::SetId;

impl From<DescriptorError> for gvl_core::Error {
    fn from(err: DescriptorError) -> Self {
        gvl_core::Error::UnknownDescriptorOperation(err.to_string())
    }
}
