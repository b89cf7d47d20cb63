use gvl_container::{tag, Container};

use crate::error::{FrontendError, Result};

/// One entry of an input/output signature: semantic name, semantic index,
/// register, mask, and component format -- enough for the descriptor model
/// to validate a pipeline's stage-linkage without re-parsing the shader
/// body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub register: u32,
    pub mask: u8,
    pub format: u32,
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes.get(offset..offset + 4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

/// Signature chunks are a flat record stream: count, then `count` fixed
/// records of (name-length, name-bytes padded to 4, index, register, mask,
/// format).
fn parse_signature(body: &[u8]) -> Result<Vec<SignatureEntry>> {
    let mut entries = Vec::new();
    if body.len() < 4 {
        return Ok(entries);
    }
    let count = read_u32(body, 0).unwrap_or(0) as usize;
    let mut offset = 4;
    for _ in 0..count {
        let name_len = read_u32(body, offset).ok_or(FrontendError::MissingChunk(tag::SIGNATURE_INPUT))? as usize;
        offset += 4;
        let name_padded = (name_len + 3) & !3;
        let name_bytes = body
            .get(offset..offset + name_len)
            .ok_or(FrontendError::MissingChunk(tag::SIGNATURE_INPUT))?;
        let semantic_name = String::from_utf8_lossy(name_bytes).into_owned();
        offset += name_padded;
        let semantic_index = read_u32(body, offset).unwrap_or(0);
        offset += 4;
        let register = read_u32(body, offset).unwrap_or(0);
        offset += 4;
        let mask = body.get(offset).copied().unwrap_or(0);
        offset += 1;
        let format = read_u32(body, offset).unwrap_or(0);
        offset += 4;
        entries.push(SignatureEntry {
            semantic_name,
            semantic_index,
            register,
            mask,
            format,
        });
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureInfo {
    pub bitmask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSignatureDesc {
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineStateValidation {
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugInfo {
    pub name: Option<String>,
    /// Filename of a companion PDB-equivalent, if the debug chunk recorded
    /// one -- the caller resolves and loads it out of band.
    pub companion_file: Option<String>,
}

fn parse_debug(body: &[u8]) -> DebugInfo {
    let text = String::from_utf8_lossy(body);
    let mut parts = text.splitn(2, '\0');
    let name = parts.next().filter(|s| !s.is_empty()).map(str::to_owned);
    let companion_file = parts.next().filter(|s| !s.is_empty()).map(str::to_owned);
    DebugInfo { name, companion_file }
}

/// Everything the container front-end extracts before handing the bitstream
/// chunk (if any) to the module front-end.
#[derive(Debug, Clone, Default)]
pub struct ParsedContainer {
    pub input_signature: Vec<SignatureEntry>,
    pub output_signature: Vec<SignatureEntry>,
    pub feature_info: FeatureInfo,
    pub root_signature: Option<RootSignatureDesc>,
    pub pso_validation: Option<PipelineStateValidation>,
    pub debug: Option<DebugInfo>,
    pub content_hash: Option<u64>,
    pub bitstream_module: Option<Vec<u8>>,
}

pub fn parse_container(container: &Container) -> Result<ParsedContainer> {
    let input_signature = container
        .known
        .get(&tag::SIGNATURE_INPUT)
        .map(|b| parse_signature(b))
        .transpose()?
        .unwrap_or_default();
    let output_signature = container
        .known
        .get(&tag::SIGNATURE_OUTPUT)
        .map(|b| parse_signature(b))
        .transpose()?
        .unwrap_or_default();
    let feature_info = container
        .known
        .get(&tag::FEATURE_INFO)
        .and_then(|b| read_u32(b, 0))
        .map(|bitmask| FeatureInfo { bitmask })
        .unwrap_or_default();
    let root_signature = container
        .known
        .get(&tag::ROOT_SIGNATURE)
        .map(|b| RootSignatureDesc { raw: b.clone() });
    let pso_validation = container
        .known
        .get(&tag::PIPELINE_STATE_VALIDATION)
        .map(|b| PipelineStateValidation { raw: b.clone() });
    let debug = container.known.get(&tag::DEBUG_VARIANTS).map(|b| parse_debug(b));
    let content_hash = container
        .known
        .get(&tag::CONTENT_HASH)
        .and_then(|b| b.get(0..8))
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()));
    let bitstream_module = container.known.get(&tag::BITSTREAM_MODULE).cloned();

    Ok(ParsedContainer {
        input_signature,
        output_signature,
        feature_info,
        root_signature,
        pso_validation,
        debug,
        content_hash,
        bitstream_module,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signature_chunk_parses_as_no_entries() {
        let entries = parse_signature(&[]).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn single_signature_entry_round_trips_its_fields() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        let name = b"POSITION";
        body.extend_from_slice(&(name.len() as u32).to_le_bytes());
        body.extend_from_slice(name);
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&42u32.to_le_bytes());
        body.push(0b1111);
        body.extend_from_slice(&7u32.to_le_bytes());

        let entries = parse_signature(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].semantic_name, "POSITION");
        assert_eq!(entries[0].register, 42);
        assert_eq!(entries[0].mask, 0b1111);
        assert_eq!(entries[0].format, 7);
    }

    #[test]
    fn debug_chunk_splits_name_from_companion_file() {
        let body = b"main\0main.pdb".to_vec();
        let debug = parse_debug(&body);
        assert_eq!(debug.name.as_deref(), Some("main"));
        assert_eq!(debug.companion_file.as_deref(), Some("main.pdb"));
    }
}
