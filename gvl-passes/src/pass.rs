use gvl_core::{ErrorRecord, ResourceResolver, StageFlags, ValidationMessage};
use gvl_il::Program;

use crate::location::LocationRegistry;
use crate::registry::PassUids;

/// Binding kinds a pass can declare into the diagnostic descriptor set
/// (§4.7's "diagnostic set"). Mirrors the handful of descriptor types the
/// passes actually need: a lock table (read-write texel buffer), per-binding
/// metadata (uniform buffer), and the PRMT-adjacent sampler/image slots a
/// combined-image-sampler rewrite might need a matching declaration for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorBindingKind {
    UniformBuffer,
    StorageBuffer,
    UniformTexelBuffer,
    StorageTexelBuffer,
    Sampler,
    SampledImage,
    StorageImage,
}

/// One binding a pass wants appended to every shader-visible
/// descriptor-set-layout (§4.5 `EnumerateDescriptors`).
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBinding {
    pub kind: DescriptorBindingKind,
    pub count: u32,
    pub stages: StageFlags,
}

/// One push-constant dword range a pass wants appended to every
/// pipeline-layout (§4.5 `EnumeratePushConstants`).
#[derive(Debug, Clone, Copy)]
pub struct PushConstantDecl {
    pub dword_count: u32,
    pub stages: StageFlags,
}

/// Per-descriptor-set scratch a pass needs, sized by binding count (§4.5
/// `EnumerateStorage`, §3 "Descriptor Storage Slot").
#[derive(Debug, Clone, Copy)]
pub struct StorageDecl {
    pub dwords_per_binding: u32,
}

/// A single tracked descriptor write, as recorded by the descriptor model
/// (C7) and handed to a pass's `UpdateDescriptors` hook so it can derive
/// pass-specific per-binding metadata (e.g. a lock-uid) from it.
#[derive(Debug, Clone)]
pub struct TrackedWrite {
    pub binding: u32,
    pub array_element: u32,
    pub payload: Vec<u8>,
}

/// The two descriptor-set sides `UpdateDescriptors` deals with: the
/// application's own bindings (`top_descriptors`) and the layer's
/// diagnostic-set bindings for this pass (`diag_descriptors`), per §4.5.
pub struct UpdateDescriptorsCtx<'a> {
    pub set_uid: u64,
    pub is_update: bool,
    pub is_push: bool,
    pub top_descriptors: &'a [TrackedWrite],
    pub diag_descriptors: &'a mut Vec<u8>,
}

/// Context for `UpdatePushConstants`, invoked just before a draw/dispatch
/// (§4.5).
pub struct PushConstantCtx<'a> {
    pub invocation_shared_id: u32,
    pub data: &'a mut [u8],
}

/// Render-pass-boundary hook context (§4.5 `BeginRenderPass`/`EndRenderPass`),
/// carrying the PUIDs of the attached render-target subresources.
pub struct RenderPassCtx<'a> {
    pub attached_puids: &'a [gvl_core::Puid],
}

/// The full lifecycle capability set a validation feature implements (§4.5,
/// §9 "Dynamic dispatch over passes": "a Pass value is a value-type holding
/// function pointers or an interface handle"). One object per enabled
/// feature is held as a `Box<dyn Pass>` by the registry in `gvl-layer`.
pub trait Pass: Send + Sync {
    /// The feature-id this pass decodes records for (§3 "Pass").
    fn feature_id(&self) -> u16;

    /// Called once at device init with the uids this pass claimed from the
    /// registry's monotonic counters (§4.5 `Register()`).
    fn bind_uids(&mut self, uids: PassUids);

    fn uids(&self) -> PassUids;

    fn enumerate_descriptors(&self) -> &[DescriptorBinding] {
        &[]
    }

    fn enumerate_push_constants(&self) -> &[PushConstantDecl] {
        &[]
    }

    fn enumerate_storage(&self) -> &[StorageDecl] {
        &[]
    }

    /// Writes pass-specific metadata for a descriptor-set update, or patches
    /// the diagnostic descriptors into the blob being built for a proxied
    /// update (§4.5 `UpdateDescriptors`).
    fn update_descriptors(&self, _ctx: &mut UpdateDescriptorsCtx) {}

    /// Fills this pass's push-constant dwords ahead of a draw/dispatch
    /// (§4.5 `UpdatePushConstants`).
    fn update_push_constants(&self, _ctx: &mut PushConstantCtx) {}

    /// Inserts this pass's rewrite into `program.functions[function_index]`,
    /// using `locations` to register any new instrumented sites. Takes the
    /// whole [`Program`] rather than just the `Function` because a rewrite
    /// needs the program's id counter and type/constant tables to build new
    /// IL, not only the function's own blocks. Returns `Err` only when the
    /// pass cannot preserve the function's structured control flow (§7
    /// "pass-rewrite error") -- the caller skips this pass for this
    /// function and proceeds with the others.
    fn rewrite_function(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
    ) -> crate::error::Result<()>;

    /// Decodes every record in `records` that belongs to this pass (the
    /// caller has already filtered by feature-id), merging duplicates by
    /// payload key. `resolver` maps a record's resource-key back to a live
    /// PUID (§4.7); a pass whose payload carries one consults it to fill in
    /// `ObjectInfo::puid` instead of a reserved null id. Returns one
    /// [`ValidationMessage`] per distinct key.
    fn handle(&self, command_version: u64, records: &[ErrorRecord], resolver: &dyn ResourceResolver) -> Vec<ValidationMessage>;

    fn step(&mut self) {}

    fn report(&mut self) {}

    fn flush(&mut self) {}

    fn begin_render_pass(&mut self, _ctx: &RenderPassCtx) {}

    fn end_render_pass(&mut self, _ctx: &RenderPassCtx) {}
}
