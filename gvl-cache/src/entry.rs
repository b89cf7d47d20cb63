use serde::{Deserialize, Serialize};

/// One cached instrumentation result: the instrumented bytecode blob
/// (§4.8 "Value: instrumented bytecode blob").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
}

impl CacheEntry {
    pub fn new(bytes: Vec<u8>) -> Self {
        CacheEntry { bytes }
    }
}
