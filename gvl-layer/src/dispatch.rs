use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::DeviceState;

/// Process-wide device-state table keyed by dispatch key (§9 "Global
/// mutable state: the device-state table and dispatch-table-by-key map are
/// process-wide state with device-create / device-destroy lifecycle").
///
/// Modelled as an explicit struct rather than a language-level `static` so
/// the embedding driver-interception shim (the actual `vkCreateDevice` /
/// `ID3D12CreateDevice` hook, out of this core's scope per §1) owns exactly
/// one instance for the process and controls its lifetime -- the same
/// "one table, many devices, ref-counted entries" shape §9 describes,
/// without baking a global into the library.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<usize, Arc<DeviceState>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created device under its dispatch key -- the
    /// first machine word of every wrapped handle belonging to it (§6).
    pub fn register(&self, dispatch_key: usize, device: Arc<DeviceState>) {
        self.devices.write().insert(dispatch_key, device);
    }

    pub fn lookup(&self, dispatch_key: usize) -> Option<Arc<DeviceState>> {
        self.devices.read().get(&dispatch_key).cloned()
    }

    /// Removes the device's entry, draining its worker pool first (§9:
    /// "a device-destroy drains its worker pool before removing the
    /// entry"). Returns the device so the caller can finish any native
    /// teardown once every `Arc` this registry handed out elsewhere has
    /// been dropped.
    pub fn unregister(&self, dispatch_key: usize) -> Option<Arc<DeviceState>> {
        let device = self.devices.write().remove(&dispatch_key)?;
        device.drain_worker_pool();
        Some(device)
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
