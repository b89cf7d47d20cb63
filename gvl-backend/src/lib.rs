pub mod backend;
pub mod error;
pub mod lower;
pub mod pipeline;
pub mod relocation;

pub use backend::{instrument_container, passthrough, InstrumentResult};
pub use error::{BackendError, Result};
pub use pipeline::{PassPipeline, PipelineReport};
