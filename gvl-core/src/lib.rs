pub mod config;
pub mod crc64;
pub mod error;
pub mod handle;
pub mod logging;
pub mod message;
pub mod puid;
pub mod record;
pub mod resolver;

pub use config::{FeatureFlags, LayerConfig, StageFlags};
pub use error::{Error, Result, Severity};
pub use handle::ControlBlock;
pub use message::{MessageKind, ObjectInfo, PayloadKey, SourceExtract, ValidationMessage};
pub use puid::{Puid, PuidAllocator, ResourceKind, ViewScope, NULL_BUFFER_PUID, NULL_TEXTURE_PUID};
pub use record::{ErrorRecord, MAX_PAYLOAD, MAX_SPAN_GUID};
pub use resolver::{NullResolver, ResourceResolver};
