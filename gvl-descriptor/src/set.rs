use std::collections::HashMap;

use gvl_passes::TrackedWrite;

/// Opaque identifier for one descriptor set, as seen by the descriptor model.
/// In a real layer this is the wrapped set's `ControlBlock` address; tests
/// and `gvl-layer` are free to hand out any distinct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(pub u64);

/// A wrapped descriptor-set (§4.7 "Wrapped Handle" / "A wrapped
/// descriptor-set holds..."). `tracked` is keyed by `(binding, array_element)`
/// so a later write to the same slot replaces rather than appends.
pub struct WrappedDescriptorSet {
    pub set_id: SetId,
    pub layout_id: u64,
    pub tracked: HashMap<(u32, u32), TrackedWrite>,
    pub commit_index: u64,
    pub commit_hash: u64,
    pub valid: bool,
    /// Per-pass diagnostic-descriptor scratch, keyed by storage-uid.
    pub storage: HashMap<u16, Vec<u8>>,
}

impl WrappedDescriptorSet {
    pub fn new(set_id: SetId, layout_id: u64) -> Self {
        WrappedDescriptorSet {
            set_id,
            layout_id,
            tracked: HashMap::new(),
            commit_index: 0,
            commit_hash: 0,
            valid: false,
            storage: HashMap::new(),
        }
    }

    /// Records one write and folds its payload into the running commit hash
    /// (§4.7: "the hash is recombined"). Replacing an existing slot still
    /// recombines from the set's current hash rather than rehashing
    /// everything, matching `gvl_core::crc64::combine`'s incremental model.
    pub(crate) fn apply_write(&mut self, write: TrackedWrite) {
        self.commit_hash = gvl_core::crc64::combine(self.commit_hash, &write.payload);
        self.tracked.insert((write.binding, write.array_element), write);
        self.commit_index += 1;
        self.valid = true;
    }
}
