pub mod container;
pub mod error;
pub mod tag;

pub use container::{compile, parse, Container, RawChunk};
pub use error::{ContainerError, Result};
pub use tag::ChunkTag;
