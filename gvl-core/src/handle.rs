use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Every opaque API handle the layer hands back to the application is
/// actually a pointer to one of these. The dispatch key MUST stay the first
/// field: `*(void**)handle -> dispatch table` has to work uniformly for
/// wrapped and native handles alike.
#[repr(C)]
pub struct ControlBlock<Native, Device> {
    dispatch_key: *const (),
    native: Native,
    ref_count: AtomicUsize,
    device: Arc<Device>,
    /// Feature-specific scratch, keyed by storage-uid.
    scratch: RwLock<HashMap<u16, Box<dyn Any + Send + Sync>>>,
    commit_index: AtomicU64,
}

// SAFETY: the dispatch key is an opaque tag copied from the device's
// dispatch table, never dereferenced by this crate; `Native`/`Device` carry
// their own Send/Sync bounds at the call site.
unsafe impl<Native: Send, Device: Send + Sync> Send for ControlBlock<Native, Device> {}
unsafe impl<Native: Sync, Device: Send + Sync> Sync for ControlBlock<Native, Device> {}

impl<Native, Device> ControlBlock<Native, Device> {
    pub fn new(dispatch_key: *const (), native: Native, device: Arc<Device>) -> Self {
        Self {
            dispatch_key,
            native,
            ref_count: AtomicUsize::new(1),
            device,
            scratch: RwLock::new(HashMap::new()),
            commit_index: AtomicU64::new(0),
        }
    }

    pub fn dispatch_key(&self) -> *const () {
        self.dispatch_key
    }

    pub fn native(&self) -> &Native {
        &self.native
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn retain(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the reference count, returning the count after the
    /// decrement. The caller tears the control block down once this hits 0.
    pub fn release(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Bumped on every content mutation (descriptor write, feature-set
    /// change replay, ...). Used by callers to detect staleness cheaply.
    pub fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::Acquire)
    }

    pub fn bump_commit(&self) -> u64 {
        self.commit_index.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Ensures pass-specific scratch exists for `storage_uid`, inserting the
    /// result of `init` if it does not.
    pub fn ensure_scratch<T: Send + Sync + 'static>(&self, storage_uid: u16, init: impl FnOnce() -> T) {
        if !self.scratch.read().contains_key(&storage_uid) {
            self.scratch
                .write()
                .entry(storage_uid)
                .or_insert_with(|| Box::new(init()));
        }
    }

    pub fn scratch_ref<T: Send + Sync + 'static, R>(&self, storage_uid: u16, f: impl FnOnce(Option<&T>) -> R) -> R {
        let guard = self.scratch.read();
        f(guard.get(&storage_uid).and_then(|b| b.downcast_ref::<T>()))
    }

    pub fn scratch_mut<T: Send + Sync + 'static, R>(&self, storage_uid: u16, f: impl FnOnce(Option<&mut T>) -> R) -> R {
        let mut guard = self.scratch.write();
        f(guard.get_mut(&storage_uid).and_then(|b| b.downcast_mut::<T>()))
    }

    pub fn remove_scratch(&self, storage_uid: u16) {
        self.scratch.write().remove(&storage_uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_round_trips_by_storage_uid() {
        struct Device;
        let cb: ControlBlock<u32, Device> = ControlBlock::new(std::ptr::null(), 7, Arc::new(Device));
        cb.ensure_scratch::<Vec<u32>>(3, Vec::new);
        cb.scratch_mut::<Vec<u32>, _>(3, |v| v.unwrap().push(42));
        let read_back = cb.scratch_ref::<Vec<u32>, _>(3, |v| v.cloned());
        assert_eq!(read_back, Some(vec![42]));
    }

    #[test]
    fn commit_index_increments() {
        struct Device;
        let cb: ControlBlock<u32, Device> = ControlBlock::new(std::ptr::null(), 0, Arc::new(Device));
        assert_eq!(cb.commit_index(), 0);
        assert_eq!(cb.bump_commit(), 1);
        assert_eq!(cb.commit_index(), 1);
    }
}
