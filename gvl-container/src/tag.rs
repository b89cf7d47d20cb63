use std::fmt;

/// Four-character chunk tag keying the outer container's chunk table (§4.2).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(*tag)
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Input stage signature chunk.
pub const SIGNATURE_INPUT: ChunkTag = ChunkTag::new(b"SIGI");
/// Output stage signature chunk.
pub const SIGNATURE_OUTPUT: ChunkTag = ChunkTag::new(b"SIGO");
/// Resource bindings table chunk.
pub const RESOURCE_BINDINGS: ChunkTag = ChunkTag::new(b"RBND");
/// Feature-info bitmask chunk.
pub const FEATURE_INFO: ChunkTag = ChunkTag::new(b"FEAT");
/// Shader body chunk wrapping the nested bytecode (bitstream or otherwise).
pub const SHADER_BODY: ChunkTag = ChunkTag::new(b"SHDR");
/// Pipeline-state validation chunk.
pub const PIPELINE_STATE_VALIDATION: ChunkTag = ChunkTag::new(b"PSOV");
/// Root-signature chunk.
pub const ROOT_SIGNATURE: ChunkTag = ChunkTag::new(b"RSIG");
/// Debug variants / PDB companion chunk.
pub const DEBUG_VARIANTS: ChunkTag = ChunkTag::new(b"DBGV");
/// Content hash chunk, recomputed post-emit.
pub const CONTENT_HASH: ChunkTag = ChunkTag::new(b"HASH");
/// Nested bitstream chunk carrying the program module (fed to C1/C4).
pub const BITSTREAM_MODULE: ChunkTag = ChunkTag::new(b"BCMD");

/// All recognised tags, in the canonical order known chunks are re-emitted
/// (§4.2: "re-emitting each known chunk ... followed by verbatim bytes for
/// each unexposed chunk").
pub const RECOGNISED_TAGS: &[ChunkTag] = &[
    SIGNATURE_INPUT,
    SIGNATURE_OUTPUT,
    RESOURCE_BINDINGS,
    FEATURE_INFO,
    ROOT_SIGNATURE,
    PIPELINE_STATE_VALIDATION,
    DEBUG_VARIANTS,
    BITSTREAM_MODULE,
    SHADER_BODY,
    CONTENT_HASH,
];

pub fn is_recognised(tag: ChunkTag) -> bool {
    RECOGNISED_TAGS.contains(&tag)
}
