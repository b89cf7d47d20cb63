use serde::{Deserialize, Serialize};

/// Cache key (§4.8): the original bytecode's content hash, the active
/// feature bitmask at instrumentation time, and the pass-pipeline version
/// (bumped whenever a pass's rewrite semantics change, so a stale on-disk
/// entry from an older binary never gets reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_hash: u64,
    pub feature_mask: u32,
    pub pipeline_version: u32,
}
