//! Report message shapes (§6 "Report messages (host->application)"): the
//! structures a decoded, deduplicated [`crate::record::ErrorRecord`]
//! eventually becomes on its way back to the application. Lives in
//! `gvl-core` rather than the pass or report crate because both the
//! instrumentation passes (decode) and the report aggregator (dedup,
//! accumulate, emit) need the same shape without introducing a dependency
//! cycle between those two crates.
use crate::puid::Puid;

/// A source extract: enough to point a developer at the exact shader line
/// an injected guard failed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceExtract {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub snippet: Option<String>,
}

/// Identifies the resource object a message is about, for the
/// `object info (PUID + optional debug name)` field (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub puid: Puid,
    pub debug_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ValidationError,
}

/// Dedup key: records with the same `(feature_id, span_guid, resource_key)`
/// are merged into one message with an incremented count (§4.9, §8 dedup
/// rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadKey {
    pub feature_id: u8,
    pub span_guid: u32,
    pub resource_key: u32,
}

/// One report entry, merged across every record sharing its [`PayloadKey`]
/// within a `Handle` call (§4.5) and potentially again across calls by the
/// report aggregator (§4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub kind: MessageKind,
    pub merged_count: u32,
    pub feature_id: u16,
    pub error_subtype: u32,
    pub text: String,
    pub object: Option<ObjectInfo>,
    pub source: Option<SourceExtract>,
    pub marker_stack: Vec<String>,
}
