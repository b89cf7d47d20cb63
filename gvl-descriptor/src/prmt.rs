use std::collections::HashMap;

use gvl_core::{Puid, ViewScope};

use crate::set::SetId;

/// One physical resource mapping table entry: a PUID plus the view-scope a
/// particular descriptor slot sees (§3 "Virtual Mapping").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrmtEntry {
    pub puid: Puid,
    pub view: ViewScope,
}

/// The PRM table: one side-table per descriptor heap, indexed by
/// `(descriptor-set, binding-offset-within-set)` (§3). `CopyDescriptors`
/// replicates entries atomically with respect to the view state by holding
/// the pool's single lock across the whole range copy (see
/// [`crate::pool::DescriptorPool::copy_descriptors`]).
#[derive(Default)]
pub struct Prmt {
    entries: HashMap<(SetId, u32), PrmtEntry>,
}

impl Prmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, set: SetId, binding_offset: u32, entry: PrmtEntry) {
        self.entries.insert((set, binding_offset), entry);
    }

    pub fn get(&self, set: SetId, binding_offset: u32) -> Option<PrmtEntry> {
        self.entries.get(&(set, binding_offset)).copied()
    }

    /// Looks up an entry by binding-offset alone, regardless of which set it
    /// lives in (§4.7). A record's payload can only carry the narrow
    /// resource-key the guard had on hand at rewrite time, not a full
    /// `(set, offset)` pair, so decode-time resolution falls back to
    /// scanning every set for a matching offset. Ambiguous only if two live
    /// sets reuse the same offset for different resources, in which case an
    /// arbitrary one of them wins.
    pub fn find_by_offset(&self, binding_offset: u32) -> Option<PrmtEntry> {
        self.entries.iter().find(|((_, offset), _)| *offset == binding_offset).map(|(_, entry)| *entry)
    }

    /// Copies `count` consecutive entries from `(src, src_offset)` to
    /// `(dst, dst_offset)` (§4.7 "Copying a descriptor replicates both the
    /// virtual mapping ... and the tracked metadata"). Source slots with no
    /// entry simply leave the destination slot untouched, matching a
    /// descriptor-copy over a sparsely-populated range.
    pub fn copy_range(&mut self, src: SetId, src_offset: u32, dst: SetId, dst_offset: u32, count: u32) {
        for k in 0..count {
            if let Some(entry) = self.get(src, src_offset + k) {
                self.write(dst, dst_offset + k, entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(width: u32) -> ViewScope {
        ViewScope {
            base_mip: 0,
            mip_count: 1,
            base_slice: 0,
            slice_count: 1,
            base_width: 0,
            width,
            format_id: 0,
            format_size: 4,
            element_count: width,
        }
    }

    #[test]
    fn copy_range_replicates_contiguous_entries() {
        let mut prmt = Prmt::new();
        let a = SetId(1);
        let b = SetId(2);
        for k in 0..3 {
            prmt.write(a, k, PrmtEntry { puid: 100 + k, view: view(64) });
        }
        prmt.copy_range(a, 0, b, 10, 3);
        for k in 0..3 {
            assert_eq!(prmt.get(b, 10 + k), prmt.get(a, k));
        }
    }

    #[test]
    fn find_by_offset_ignores_which_set_the_entry_lives_in() {
        let mut prmt = Prmt::new();
        prmt.write(SetId(7), 3, PrmtEntry { puid: 42, view: view(16) });
        assert_eq!(prmt.find_by_offset(3), Some(PrmtEntry { puid: 42, view: view(16) }));
        assert_eq!(prmt.find_by_offset(4), None);
    }
}
