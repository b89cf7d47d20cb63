use crate::puid::Puid;

/// Resolves a decoded record's resource-key back to the PUID it names
/// (§3, §4.7). Guard code can only embed what it has on the GPU side -- the
/// PRMT binding-offset it indexed through, not a host-only PUID -- so the
/// mapping back to an object identity happens once, host-side, at decode
/// time, the same hand-off `GetDescriptorObjectInfo` makes in the original
/// descriptor model. A key with no live mapping (an already-destroyed
/// resource, a key that was never a real binding) resolves to `None`; the
/// caller falls back to the reserved null PUID rather than treating it as
/// decode failure.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, resource_key: u32) -> Option<Puid>;
}

/// A resolver that never maps anything, for tests and call sites with no
/// live descriptor table to consult.
pub struct NullResolver;

impl ResourceResolver for NullResolver {
    fn resolve(&self, _resource_key: u32) -> Option<Puid> {
        None
    }
}
