pub use crate::config::Severity;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds per §7. Parse/pass/allocation failures are recovered locally
/// by the caller (fall back to passthrough, disable a feature); round-trip
/// validation failure is a hard assertion that still degrades to a fallback
/// rather than propagating a panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{file}:{line}: bytecode failed to scan or re-emit: {message}")]
    Codec {
        file: &'static str,
        line: u32,
        message: String,
    },

    #[error("pass {feature_id:#06x} could not rewrite a basic block: {reason}")]
    PassRewrite { feature_id: u16, reason: String },

    #[error("emitted bytecode did not re-scan to the same IL tree")]
    RoundTripValidation,

    #[error("GPU buffer allocation failed for pass {feature_id:#06x}")]
    ResourceAllocation { feature_id: u16 },

    #[error("unsupported descriptor operation: {0}")]
    UnknownDescriptorOperation(String),
}

impl Error {
    pub fn codec(file: &'static str, line: u32, message: impl Into<String>) -> Self {
        Error::Codec {
            file,
            line,
            message: message.into(),
        }
    }
}

/// Shorthand matching the original's `(__FILE__, __LINE__, message)` warning
/// convention (§7): builds a codec error tagged with the call site.
#[macro_export]
macro_rules! codec_error {
    ($($arg:tt)*) => {
        $crate::error::Error::codec(file!(), line!(), format!($($arg)*))
    };
}
