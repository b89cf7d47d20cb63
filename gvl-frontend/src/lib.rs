pub mod container_front;
pub mod error;
pub mod module_front;
pub mod opcodes;

pub use container_front::{
    DebugInfo, FeatureInfo, ParsedContainer, PipelineStateValidation, RootSignatureDesc,
    SignatureEntry, parse_container,
};
pub use error::{FrontendError, Result};
pub use module_front::{lift, CombinedSplit, LiftedModule};
