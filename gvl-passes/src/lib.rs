pub mod data_race;
pub mod descriptor_validity;
pub mod error;
pub mod location;
pub mod pass;
pub mod registry;
pub mod resource_bounds;
pub mod resource_init;
pub mod rewrite;

pub use data_race::DataRacePass;
pub use descriptor_validity::DescriptorValidityPass;
pub use error::{PassError, Result};
pub use location::LocationRegistry;
pub use pass::{
    DescriptorBinding, DescriptorBindingKind, Pass, PushConstantCtx, PushConstantDecl,
    RenderPassCtx, StorageDecl, TrackedWrite, UpdateDescriptorsCtx,
};
pub use registry::{PassUids, UidRegistry};
pub use resource_bounds::ResourceBoundsPass;
pub use resource_init::ResourceInitializationPass;
