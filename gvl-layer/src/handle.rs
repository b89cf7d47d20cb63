use gvl_core::ControlBlock;

use crate::device::DeviceState;

/// Opaque native handle as the driver hands it to the layer: a
/// non-dispatchable 64-bit handle, the common representation across the
/// GPU APIs this core targets. A *dispatchable* native handle's first
/// machine word already doubles as the dispatch key and is represented
/// directly by [`ControlBlock`]'s own layout instead of this wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// A wrapped shader module: the layer hands the application a pointer to
/// one of these in place of the driver's own handle (§3 "Wrapped Handle").
/// Carries the original bytecode (kept so a feature-set change can
/// re-instrument and re-create it) alongside the usual control-block
/// bookkeeping.
pub type WrappedShaderModule = ControlBlock<ShaderModuleScratch, DeviceState>;

#[derive(Debug, Clone)]
pub struct ShaderModuleScratch {
    pub original_bytes: Vec<u8>,
    pub native: NativeHandle,
}

/// A wrapped pipeline-layout: just the native handle plus the user-visible
/// set count, needed at draw time to know where the diagnostic set sits
/// (§4.7 "the diagnostic set is always bound at userSetCount").
pub type WrappedPipelineLayout = ControlBlock<PipelineLayoutScratch, DeviceState>;

#[derive(Debug, Clone, Copy)]
pub struct PipelineLayoutScratch {
    pub native: NativeHandle,
    pub user_set_count: u32,
}

/// Reads the dispatch key back out of any wrapped handle -- the lookup key
/// into a [`crate::dispatch::DeviceRegistry`].
pub fn dispatch_key_of<Native, Device>(block: &ControlBlock<Native, Device>) -> usize {
    block.dispatch_key() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvl_core::LayerConfig;
    use std::sync::Arc;

    #[test]
    fn dispatch_key_of_reads_back_the_key_the_block_was_built_with() {
        let device = Arc::new(DeviceState::new(LayerConfig::default()));
        let key: *const () = std::ptr::NonNull::dangling().as_ptr();
        let scratch = ShaderModuleScratch { original_bytes: vec![1, 2, 3], native: NativeHandle(42) };
        let block: WrappedShaderModule = ControlBlock::new(key, scratch, device);
        assert_eq!(dispatch_key_of(&block), key as usize);
        assert_eq!(block.native().native.0, 42);
    }
}
