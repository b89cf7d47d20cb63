use gvl_core::FeatureFlags;
use gvl_passes::{Pass, PassUids, UidRegistry};

/// One pass known to the registry: the feature bit toggling it, the uids it
/// claimed once at `Register()` (§4.5), and a factory building a fresh
/// instance bound to those uids. Every one of the four built-in passes
/// (`gvl-passes`) holds no state beyond its [`PassUids`], so rebuilding an
/// instance per instrumentation run is cheap and -- crucially for §8
/// property 2 ("cache determinism") -- always produces byte-identical
/// rewrites for the same feature set, since the uids never change across
/// rebuilds.
pub struct RegisteredPass {
    pub feature_bit: FeatureFlags,
    pub uids: PassUids,
    make: fn(PassUids) -> Box<dyn Pass>,
}

impl RegisteredPass {
    pub fn instantiate(&self) -> Box<dyn Pass> {
        (self.make)(self.uids)
    }
}

fn make_resource_bounds(uids: PassUids) -> Box<dyn Pass> {
    let mut pass = gvl_passes::ResourceBoundsPass::new();
    pass.bind_uids(uids);
    Box::new(pass)
}

fn make_resource_initialization(uids: PassUids) -> Box<dyn Pass> {
    let mut pass = gvl_passes::ResourceInitializationPass::new();
    pass.bind_uids(uids);
    Box::new(pass)
}

fn make_data_race(uids: PassUids) -> Box<dyn Pass> {
    let mut pass = gvl_passes::DataRacePass::new();
    pass.bind_uids(uids);
    Box::new(pass)
}

fn make_descriptor_validity(uids: PassUids) -> Box<dyn Pass> {
    let mut pass = gvl_passes::DescriptorValidityPass::new();
    pass.bind_uids(uids);
    Box::new(pass)
}

/// Registers every built-in validation feature against `registry`, claiming
/// one disjoint set of uids per pass (§4.5 `Register()`). Order here is the
/// pass pipeline's registration order (§4.6): resource-bounds first since
/// it's the cheapest/most common guard, data-race last since its lock
/// acquire/release wraps whatever bounds-guarded access the earlier passes
/// already rewrote.
pub fn register_all(registry: &UidRegistry) -> Vec<RegisteredPass> {
    let specs: [(FeatureFlags, fn(PassUids) -> Box<dyn Pass>); 4] = [
        (FeatureFlags::RESOURCE_BOUNDS, make_resource_bounds),
        (FeatureFlags::RESOURCE_INITIALIZATION, make_resource_initialization),
        (FeatureFlags::DESCRIPTOR_VALIDITY, make_descriptor_validity),
        (FeatureFlags::DATA_RACE, make_data_race),
    ];
    specs
        .into_iter()
        .map(|(feature_bit, make)| RegisteredPass {
            feature_bit,
            uids: registry.register_pass(feature_bit),
            make,
        })
        .collect()
}
