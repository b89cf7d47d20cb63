use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// Physical unique identifier. Monotonically allocated per created resource,
/// never reused for the lifetime of a device.
pub type Puid = u32;

/// Reserved id standing in for "the null buffer".
pub const NULL_BUFFER_PUID: Puid = 0;
/// Reserved id standing in for "the null texture".
pub const NULL_TEXTURE_PUID: Puid = 1;

const FIRST_ALLOCATED_PUID: Puid = 2;

/// `viewMipCount == -1` means "all remaining from baseMip"; see [`ViewScope::resolve`].
pub const VIEW_REMAINING: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
}

/// A view-scope record: the sub-range of a resource a descriptor actually sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewScope {
    pub base_mip: u32,
    pub mip_count: i32,
    pub base_slice: u32,
    pub slice_count: u32,
    pub base_width: u32,
    pub width: u32,
    pub format_id: u32,
    pub format_size: u32,
    pub element_count: u32,
}

impl ViewScope {
    /// Resolves `mip_count == VIEW_REMAINING` against the resource's total mip
    /// levels. Called once at view-creation time, per the data model invariant.
    pub fn resolve(mut self, total_mip_levels: u32) -> Self {
        if self.mip_count == VIEW_REMAINING {
            self.mip_count = (total_mip_levels.saturating_sub(self.base_mip)) as i32;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    pub kind: ResourceKind,
    pub view: ViewScope,
    pub tombstoned: bool,
}

/// Per-device allocator + table for PUIDs. PUIDs are never reused; destroying
/// a resource tombstones its slot rather than freeing the id.
pub struct PuidAllocator {
    next: AtomicU32,
    slots: Mutex<HashMap<Puid, ResourceSlot>>,
}

impl Default for PuidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PuidAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(FIRST_ALLOCATED_PUID),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh PUID and records it live with the given kind/view.
    pub fn create(&self, kind: ResourceKind, view: ViewScope) -> Puid {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(
            id,
            ResourceSlot {
                kind,
                view,
                tombstoned: false,
            },
        );
        id
    }

    /// Tombstones a resource's slot. The id is never handed out again.
    pub fn destroy(&self, puid: Puid) {
        if let Some(slot) = self.slots.lock().get_mut(&puid) {
            slot.tombstoned = true;
        }
    }

    pub fn lookup(&self, puid: Puid) -> Option<ResourceSlot> {
        self.slots.lock().get(&puid).copied()
    }

    pub fn is_live(&self, puid: Puid) -> bool {
        self.slots
            .lock()
            .get(&puid)
            .map(|slot| !slot.tombstoned)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn puids_are_never_reused() {
        let alloc = PuidAllocator::new();
        let view = ViewScope {
            base_mip: 0,
            mip_count: 1,
            base_slice: 0,
            slice_count: 1,
            base_width: 0,
            width: 64,
            format_id: 0,
            format_size: 4,
            element_count: 64,
        };
        let a = alloc.create(ResourceKind::Buffer, view);
        alloc.destroy(a);
        let b = alloc.create(ResourceKind::Buffer, view);
        assert_ne!(a, b);
        assert!(!alloc.is_live(a));
        assert!(alloc.is_live(b));
    }

    #[test]
    fn view_remaining_resolves_against_total_mips() {
        let view = ViewScope {
            base_mip: 2,
            mip_count: VIEW_REMAINING,
            base_slice: 0,
            slice_count: 1,
            base_width: 0,
            width: 16,
            format_id: 0,
            format_size: 4,
            element_count: 16,
        };
        let resolved = view.resolve(5);
        assert_eq!(resolved.mip_count, 3);
    }
}
