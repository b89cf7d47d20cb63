use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;

/// Bumped whenever the on-disk layout changes. A file written by an older
/// version is discarded rather than partially trusted (§6 "Persisted state":
/// "format is versioned and discarded on mismatch").
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    entries: HashMap<CacheKey, CacheEntry>,
}

pub fn serialize_to(path: &Path, entries: &HashMap<CacheKey, CacheEntry>) -> Result<()> {
    let persisted = PersistedCache {
        version: FORMAT_VERSION,
        entries: entries.clone(),
    };
    let config = bincode::config::standard();
    let bytes = bincode::serde::encode_to_vec(&persisted, config)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Best-effort load (§4.8 "Deserialisation on startup is best-effort; a
/// corrupt file is discarded with a warning"). Returns an empty map on any
/// read/decode failure or a version mismatch, rather than propagating the
/// error -- a broken cache file must never block device creation.
pub fn deserialize_from(path: &Path) -> HashMap<CacheKey, CacheEntry> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("could not read shader cache file {}: {err}", path.display());
            return HashMap::new();
        }
    };
    let config = bincode::config::standard();
    match bincode::serde::decode_from_slice::<PersistedCache, _>(&bytes, config) {
        Ok((persisted, _)) if persisted.version == FORMAT_VERSION => persisted.entries,
        Ok((persisted, _)) => {
            log::warn!(
                "shader cache file {} has version {}, expected {FORMAT_VERSION}; discarding",
                path.display(),
                persisted.version
            );
            HashMap::new()
        }
        Err(err) => {
            log::warn!("shader cache file {} is corrupt, discarding: {err}", path.display());
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_real_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gvl-cache-test-{}.bin", std::process::id()));
        let mut entries = HashMap::new();
        entries.insert(
            CacheKey { content_hash: 1, feature_mask: 2, pipeline_version: 3 },
            CacheEntry::new(vec![9, 8, 7]),
        );
        serialize_to(&path, &entries).unwrap();
        let loaded = deserialize_from(&path);
        assert_eq!(loaded, entries);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupt_file_is_discarded_as_empty() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gvl-cache-corrupt-{}.bin", std::process::id()));
        std::fs::write(&path, b"not a valid cache file").unwrap();
        let loaded = deserialize_from(&path);
        assert!(loaded.is_empty());
        std::fs::remove_file(&path).ok();
    }
}
