pub mod device;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod layout;
pub mod passes;
pub mod submission;
pub mod worker;

pub use device::{DeviceState, InstrumentedShader, PASS_PIPELINE_VERSION};
pub use dispatch::DeviceRegistry;
pub use error::{LayerError, Result};
pub use handle::{
    dispatch_key_of, NativeHandle, PipelineLayoutScratch, ShaderModuleScratch,
    WrappedPipelineLayout, WrappedShaderModule,
};
pub use layout::{
    append_diagnostic_bindings, append_push_constant_ranges, diagnostic_set_index,
    LayoutBinding, PushConstantRange,
};
pub use passes::RegisteredPass;
pub use submission::{PostBatchWork, PreBatchWork, SubmissionBatch};
pub use worker::CompilerWorkerPool;

pub use gvl_core::{FeatureFlags, LayerConfig, StageFlags};
