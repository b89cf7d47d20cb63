use thiserror::Error;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("pass {feature_id:#06x} could not rewrite block {block:?}: {reason}")]
    Rewrite {
        feature_id: u16,
        block: gvl_il::BlockId,
        reason: String,
    },
    #[error("pass {0:#06x} is not registered")]
    UnknownFeature(u16),
}

pub type Result<T> = std::result::Result<T, PassError>;
