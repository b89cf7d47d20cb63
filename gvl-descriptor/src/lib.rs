pub mod error;
pub mod pool;
pub mod prmt;
pub mod set;

pub use error::{DescriptorError, Result};
pub use pool::{DescriptorPool, DescriptorWrite};
pub use prmt::{Prmt, PrmtEntry};
pub use set::{SetId, WrappedDescriptorSet};
