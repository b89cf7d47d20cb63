use std::sync::atomic::{AtomicU16, Ordering};

use gvl_core::config::FeatureFlags;

/// Monotonic counters a pass's `Register()` hook draws from at device init
/// (§4.5, §9 "Dynamic dispatch over passes"). One instance lives on the
/// device-state table in `gvl-layer`; every registered pass gets a disjoint
/// slice out of each counter so none of its uids ever collides with
/// another pass's.
#[derive(Default)]
pub struct UidRegistry {
    message: AtomicU16,
    descriptor: AtomicU16,
    storage: AtomicU16,
    push_constant: AtomicU16,
}

impl UidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_message_uid(&self) -> u16 {
        self.message.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_descriptor_uid(&self) -> u16 {
        self.descriptor.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_storage_uid(&self) -> u16 {
        self.storage.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_push_constant_uid(&self) -> u16 {
        self.push_constant.fetch_add(1, Ordering::Relaxed)
    }
}

/// The uids one [`crate::Pass`] claimed during `Register()`, matching
/// §4.5's enumerated list: message-uid(s), descriptor-uid(s),
/// storage-uid(s), push-constant-uid(s), plus the feature-id bit the
/// device-create configuration's `features` bitset (§6) toggles it with.
#[derive(Debug, Clone, Copy)]
pub struct PassUids {
    pub feature_bit: FeatureFlags,
    pub message_uid: u16,
    pub descriptor_uid: u16,
    pub storage_uid: u16,
    pub push_constant_uid: u16,
}

impl Default for PassUids {
    fn default() -> Self {
        PassUids {
            feature_bit: FeatureFlags::empty(),
            message_uid: 0,
            descriptor_uid: 0,
            storage_uid: 0,
            push_constant_uid: 0,
        }
    }
}

impl UidRegistry {
    pub fn register_pass(&self, feature_bit: FeatureFlags) -> PassUids {
        PassUids {
            feature_bit,
            message_uid: self.next_message_uid(),
            descriptor_uid: self.next_descriptor_uid(),
            storage_uid: self.next_storage_uid(),
            push_constant_uid: self.next_push_constant_uid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registration_gets_disjoint_uids() {
        let registry = UidRegistry::new();
        let a = registry.register_pass(FeatureFlags::RESOURCE_BOUNDS);
        let b = registry.register_pass(FeatureFlags::DATA_RACE);
        assert_ne!(a.message_uid, b.message_uid);
        assert_ne!(a.descriptor_uid, b.descriptor_uid);
        assert_ne!(a.storage_uid, b.storage_uid);
        assert_ne!(a.push_constant_uid, b.push_constant_uid);
    }
}
