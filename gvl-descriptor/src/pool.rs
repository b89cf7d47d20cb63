use std::collections::HashMap;

use gvl_core::{Puid, ResourceResolver};
use gvl_passes::{Pass, TrackedWrite, UpdateDescriptorsCtx};
use parking_lot::Mutex;

use crate::error::{DescriptorError, Result};
use crate::prmt::{Prmt, PrmtEntry};
use crate::set::{SetId, WrappedDescriptorSet};

/// One write within an `UpdateDescriptorSets`-style batch, before it has been
/// attributed to a particular set's tracked-write table.
#[derive(Debug, Clone)]
pub struct DescriptorWrite {
    pub set: SetId,
    pub binding: u32,
    pub array_element: u32,
    pub payload: Vec<u8>,
}

struct PoolInner {
    sets: HashMap<SetId, WrappedDescriptorSet>,
    prmt: Prmt,
}

/// Owns every wrapped descriptor set plus the PRM table shared across them
/// (§3, §4.7). Mutex-guarded as a whole (§5 "Per-pool internal lock:
/// serialises concurrent access to a pool's set list"); short critical
/// sections for per-set operations, one held lock across a whole
/// `copy_descriptors` range so the copy is atomic w.r.t. concurrent updates.
pub struct DescriptorPool {
    inner: Mutex<PoolInner>,
}

impl Default for DescriptorPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorPool {
    pub fn new() -> Self {
        DescriptorPool {
            inner: Mutex::new(PoolInner {
                sets: HashMap::new(),
                prmt: Prmt::new(),
            }),
        }
    }

    pub fn allocate(&self, set_id: SetId, layout_id: u64) {
        self.inner
            .lock()
            .sets
            .entry(set_id)
            .or_insert_with(|| WrappedDescriptorSet::new(set_id, layout_id));
    }

    pub fn destroy(&self, set_id: SetId) {
        self.inner.lock().sets.remove(&set_id);
    }

    /// Every set that has received at least one tracked write (`valid`,
    /// §3), for feature-set-change replay (§4.7 "on feature-set change",
    /// §8 S6) and submission-batch bookkeeping (§5). A freshly allocated but
    /// never-written set has no diagnostic metadata to refresh.
    pub fn valid_set_ids(&self) -> Vec<SetId> {
        self.inner.lock().sets.values().filter(|set| set.valid).map(|set| set.set_id).collect()
    }

    pub fn commit_hash(&self, set_id: SetId) -> Option<u64> {
        self.inner.lock().sets.get(&set_id).map(|s| s.commit_hash)
    }

    pub fn prmt_entry(&self, set_id: SetId, binding_offset: u32) -> Option<PrmtEntry> {
        self.inner.lock().prmt.get(set_id, binding_offset)
    }

    pub fn write_prmt(&self, set_id: SetId, binding_offset: u32, entry: PrmtEntry) {
        self.inner.lock().prmt.write(set_id, binding_offset, entry);
    }

    /// Applies one `UpdateDescriptorSets`/`PushDescriptorSet` batch (§4.7).
    /// Every write in `writes` must target the same set -- a batch spanning
    /// more than one set is a mixed-set update and is rejected outright,
    /// with none of its writes applied.
    pub fn update_descriptor_sets(
        &self,
        writes: &[DescriptorWrite],
        passes: &[Box<dyn Pass>],
        is_push: bool,
    ) -> Result<()> {
        let Some(first) = writes.first() else { return Ok(()) };
        let target = first.set;
        if let Some(other) = writes.iter().map(|w| w.set).find(|&s| s != target) {
            return Err(DescriptorError::MixedSetUpdate(target, other));
        }

        let mut inner = self.inner.lock();
        if !inner.sets.contains_key(&target) {
            return Err(DescriptorError::SetNotAllocated(target));
        }

        let snapshot: Vec<TrackedWrite> = writes
            .iter()
            .map(|w| TrackedWrite {
                binding: w.binding,
                array_element: w.array_element,
                payload: w.payload.clone(),
            })
            .collect();

        for pass in passes {
            let storage_uid = pass.uids().storage_uid;
            let set = inner.sets.get_mut(&target).expect("checked above");
            let mut diag = set.storage.remove(&storage_uid).unwrap_or_default();
            let mut ctx = UpdateDescriptorsCtx {
                set_uid: target.0,
                is_update: true,
                is_push,
                top_descriptors: &snapshot,
                diag_descriptors: &mut diag,
            };
            pass.update_descriptors(&mut ctx);
            set.storage.insert(storage_uid, diag);
        }

        let set = inner.sets.get_mut(&target).expect("checked above");
        for write in snapshot {
            set.apply_write(write);
        }

        Ok(())
    }

    /// Copies `count` descriptors from `(src, src_offset)` to
    /// `(dst, dst_offset)`: both the PRMT mapping and the tracked metadata
    /// (§4.7). The whole range copy runs under one lock acquisition so it's
    /// atomic w.r.t. a concurrent update to either set.
    pub fn copy_descriptors(&self, src: SetId, src_offset: u32, dst: SetId, dst_offset: u32, count: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.sets.contains_key(&src) {
            return Err(DescriptorError::SetNotAllocated(src));
        }
        if !inner.sets.contains_key(&dst) {
            return Err(DescriptorError::SetNotAllocated(dst));
        }

        inner.prmt.copy_range(src, src_offset, dst, dst_offset, count);

        let writes: Vec<(u32, Option<TrackedWrite>)> = (0..count)
            .map(|k| {
                let source = inner.sets[&src].tracked.get(&(src_offset + k, 0)).cloned();
                (k, source)
            })
            .collect();

        let dst_set = inner.sets.get_mut(&dst).expect("checked above");
        for (k, write) in writes {
            if let Some(mut write) = write {
                write.binding = dst_offset + k;
                dst_set.apply_write(write);
            }
        }

        Ok(())
    }

    /// Replays every tracked write on `set_id` through each pass's
    /// `update_descriptors` again, without touching the PRMT or the set's
    /// tracked-write table -- the regenerated diagnostic metadata reflects
    /// the new feature set, but no user-visible state (and therefore no
    /// commit-hash) changes (§4.7 "on feature-set change", §8 S6).
    pub fn instrument_live_set(&self, set_id: SetId, passes: &[Box<dyn Pass>]) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.sets.contains_key(&set_id) {
            return Err(DescriptorError::SetNotAllocated(set_id));
        }

        let snapshot: Vec<TrackedWrite> = inner.sets[&set_id].tracked.values().cloned().collect();

        for pass in passes {
            let storage_uid = pass.uids().storage_uid;
            let set = inner.sets.get_mut(&set_id).expect("checked above");
            let mut diag = set.storage.remove(&storage_uid).unwrap_or_default();
            let mut ctx = UpdateDescriptorsCtx {
                set_uid: set_id.0,
                is_update: true,
                is_push: false,
                top_descriptors: &snapshot,
                diag_descriptors: &mut diag,
            };
            pass.update_descriptors(&mut ctx);
            set.storage.insert(storage_uid, diag);
        }

        Ok(())
    }
}

/// Host-side half of the PRMT hand-off (§4.7, §3): a guard's payload can
/// only ever carry the binding-offset it indexed through, so this resolves
/// that offset back to the PUID it currently maps to at decode time,
/// regardless of which set holds the mapping.
impl ResourceResolver for DescriptorPool {
    fn resolve(&self, resource_key: u32) -> Option<Puid> {
        self.inner.lock().prmt.find_by_offset(resource_key).map(|entry| entry.puid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvl_passes::PassUids;
    use gvl_core::{ErrorRecord, ValidationMessage};
    use gvl_il::Program;

    struct NoopPass(PassUids);
    impl Pass for NoopPass {
        fn feature_id(&self) -> u16 {
            1
        }
        fn bind_uids(&mut self, uids: PassUids) {
            self.0 = uids;
        }
        fn uids(&self) -> PassUids {
            self.0
        }
        fn rewrite_function(&self, _program: &mut Program, _function_index: usize, _locations: &mut gvl_passes::LocationRegistry) -> gvl_passes::Result<()> {
            Ok(())
        }
        fn handle(&self, _command_version: u64, _records: &[ErrorRecord], _resolver: &dyn gvl_core::ResourceResolver) -> Vec<ValidationMessage> {
            Vec::new()
        }
    }

    fn pass_with_storage_uid(uid: u16) -> Box<dyn Pass> {
        let mut uids = PassUids::default();
        uids.storage_uid = uid;
        Box::new(NoopPass(uids))
    }

    #[test]
    fn mixed_set_update_is_rejected_and_nothing_is_applied() {
        let pool = DescriptorPool::new();
        pool.allocate(SetId(1), 0);
        pool.allocate(SetId(2), 0);
        let writes = vec![
            DescriptorWrite { set: SetId(1), binding: 0, array_element: 0, payload: vec![1] },
            DescriptorWrite { set: SetId(2), binding: 0, array_element: 0, payload: vec![2] },
        ];
        let err = pool.update_descriptor_sets(&writes, &[], false).unwrap_err();
        assert!(matches!(err, DescriptorError::MixedSetUpdate(_, _)));
        assert_eq!(pool.commit_hash(SetId(1)), Some(0));
    }

    #[test]
    fn single_set_update_recombines_the_commit_hash() {
        let pool = DescriptorPool::new();
        pool.allocate(SetId(1), 0);
        let writes = vec![DescriptorWrite { set: SetId(1), binding: 0, array_element: 0, payload: vec![9, 9] }];
        pool.update_descriptor_sets(&writes, &[], false).unwrap();
        assert_ne!(pool.commit_hash(SetId(1)), Some(0));
    }

    #[test]
    fn copy_descriptors_replicates_prmt_and_tracked_metadata() {
        let pool = DescriptorPool::new();
        pool.allocate(SetId(1), 0);
        pool.allocate(SetId(2), 0);
        let writes = vec![DescriptorWrite { set: SetId(1), binding: 5, array_element: 0, payload: vec![7] }];
        pool.update_descriptor_sets(&writes, &[], false).unwrap();
        pool.write_prmt(SetId(1), 5, PrmtEntry { puid: 42, view: sample_view() });

        pool.copy_descriptors(SetId(1), 5, SetId(2), 10, 1).unwrap();

        assert_eq!(pool.prmt_entry(SetId(2), 10), pool.prmt_entry(SetId(1), 5));
        let inner = pool.inner.lock();
        assert_eq!(inner.sets[&SetId(2)].tracked[&(10, 0)].payload, vec![7]);
    }

    #[test]
    fn valid_set_ids_excludes_allocated_but_never_written_sets() {
        let pool = DescriptorPool::new();
        pool.allocate(SetId(1), 0);
        pool.allocate(SetId(2), 0);
        let writes = vec![DescriptorWrite { set: SetId(1), binding: 0, array_element: 0, payload: vec![1] }];
        pool.update_descriptor_sets(&writes, &[], false).unwrap();

        assert_eq!(pool.valid_set_ids(), vec![SetId(1)]);
    }

    #[test]
    fn instrument_live_set_leaves_commit_hash_untouched() {
        let pool = DescriptorPool::new();
        pool.allocate(SetId(1), 0);
        let writes = vec![DescriptorWrite { set: SetId(1), binding: 0, array_element: 0, payload: vec![1, 2, 3] }];
        pool.update_descriptor_sets(&writes, &[], false).unwrap();
        let before = pool.commit_hash(SetId(1));

        let passes: Vec<Box<dyn Pass>> = vec![pass_with_storage_uid(3)];
        pool.instrument_live_set(SetId(1), &passes).unwrap();

        assert_eq!(pool.commit_hash(SetId(1)), before);
    }

    #[test]
    fn resolve_finds_the_puid_a_prmt_write_mapped_to_the_offset() {
        let pool = DescriptorPool::new();
        pool.write_prmt(SetId(1), 5, PrmtEntry { puid: 42, view: sample_view() });
        assert_eq!(ResourceResolver::resolve(&pool, 5), Some(42));
        assert_eq!(ResourceResolver::resolve(&pool, 6), None);
    }

    fn sample_view() -> gvl_core::ViewScope {
        gvl_core::ViewScope {
            base_mip: 0,
            mip_count: 1,
            base_slice: 0,
            slice_count: 1,
            base_width: 0,
            width: 16,
            format_id: 0,
            format_size: 4,
            element_count: 16,
        }
    }
}
