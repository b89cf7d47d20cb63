use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use gvl_cache::{CacheConfig, CacheEntry, CacheKey, ShaderCache};
use gvl_core::{FeatureFlags, LayerConfig, PuidAllocator};
use gvl_descriptor::DescriptorPool;
use gvl_passes::{Pass, PushConstantCtx};
use gvl_report::{MessageRing, Report, ReportAggregator};

use crate::passes::{register_all, RegisteredPass};
use crate::worker::CompilerWorkerPool;

/// Bumped whenever a pass's rewrite semantics change in a way that would
/// make an on-disk cache entry from an older build unsafe to reuse (§4.8's
/// cache key: "pass-pipeline-version").
pub const PASS_PIPELINE_VERSION: u32 = 1;

/// The result of instrumenting (or passing through) one shader (§2 command
/// path, §8 S3).
#[derive(Debug, Clone)]
pub struct InstrumentedShader {
    pub bytes: Vec<u8>,
    /// The feature mask this instrumentation was built for. `0` means the
    /// empty pass set -- the result MUST be byte-identical to the original
    /// (§8 property 1).
    pub feature_mask: u32,
}

/// Per-device state: every C1-C9 subsystem instance one device owns, wired
/// together (§2, §9). One instance lives behind an `Arc` in a
/// [`crate::dispatch::DeviceRegistry`] entry for the device's lifetime.
pub struct DeviceState {
    pub config: LayerConfig,
    pub puids: PuidAllocator,
    pub descriptors: DescriptorPool,
    pub(crate) ring: MessageRing,
    pub(crate) report: Mutex<ReportAggregator>,

    registered: Vec<RegisteredPass>,
    active_features: RwLock<FeatureFlags>,
    shader_cache: ShaderCache,
    worker_pool: Mutex<Option<CompilerWorkerPool>>,
    /// Widened past 32 bits per §9's open question on the data-race pass's
    /// invocation-shared id: a `u64` counter cannot wrap within any report
    /// a real application could produce (2^64 draws/dispatches), so the
    /// truncation down to the wire format's `u32` field at
    /// [`DeviceState::update_push_constants`] can never alias two
    /// in-flight invocations against each other.
    invocation_counter: AtomicU64,
}

impl DeviceState {
    pub fn new(config: LayerConfig) -> Self {
        let registry = gvl_passes::UidRegistry::new();
        let registered = register_all(&registry);
        let worker_pool = CompilerWorkerPool::new(config.compiler_worker_count);
        let cache = ShaderCache::new(CacheConfig {
            path: config.cache_path.clone(),
            auto_serialize_entries: config.cache_serialize_entry_threshold,
            auto_serialize_interval: Duration::from_secs(config.cache_serialize_interval_secs),
        });
        let ring = MessageRing::new(1, config.default_message_count);
        let active_features = config.features;

        DeviceState {
            puids: PuidAllocator::new(),
            descriptors: DescriptorPool::new(),
            ring,
            report: Mutex::new(ReportAggregator::new()),
            registered,
            active_features: RwLock::new(active_features),
            shader_cache: cache,
            worker_pool: Mutex::new(Some(worker_pool)),
            invocation_counter: AtomicU64::new(0),
            config,
        }
    }

    pub fn active_features(&self) -> FeatureFlags {
        *self.active_features.read()
    }

    /// Builds fresh [`Pass`] instances for the feature bits currently
    /// active (§4.5 "activated per-feature-set at instrumentation time").
    /// Every instance carries the uids its pass claimed once at
    /// `Register()`, so two builds for the same feature set always embed
    /// identical uids into their rewrite -- the basis for §8 property 2.
    pub fn active_passes(&self) -> Vec<Box<dyn Pass>> {
        let active = self.active_features();
        self.registered
            .iter()
            .filter(|registered| active.intersects(registered.feature_bit))
            .map(RegisteredPass::instantiate)
            .collect()
    }

    /// Re-instruments every currently-valid descriptor set against the new
    /// feature set without reissuing any user-descriptor write to the
    /// driver (§4.7 "On feature-set change", §8 S6). Changing the active
    /// set happens first so a concurrent `UpdateDescriptorSets` racing this
    /// call always sees one consistent feature set, never a half-applied
    /// one.
    pub fn change_feature_set(&self, new_features: FeatureFlags) {
        *self.active_features.write() = new_features;
        let passes = self.active_passes();
        for set_id in self.descriptors.valid_set_ids() {
            if let Err(err) = self.descriptors.instrument_live_set(set_id, &passes) {
                log::warn!("gvl-layer: could not re-instrument {set_id:?} after feature-set change: {err}");
            }
        }
    }

    /// Instruments (or retrieves a cached instrumentation of) `original`
    /// under the currently active feature set (§2 command path: C8 asks C6
    /// to run C4->C5->C6 over C3). On any codec/pass/round-trip failure the
    /// shader falls back to uninstrumented passthrough bytes with a warning
    /// (§7); it never propagates the failure to the caller, since the
    /// original spec's whole point is that one bad shader must not block
    /// every other one.
    pub fn instrument_shader(&self, original: &[u8]) -> InstrumentedShader {
        let feature_mask = self.active_features().bits();
        let content_hash = gvl_core::crc64::hash(original);
        let key = CacheKey {
            content_hash,
            feature_mask,
            pipeline_version: PASS_PIPELINE_VERSION,
        };

        let passes = self.active_passes();
        let original_owned = original.to_vec();
        let entry = self.shader_cache.get_or_build(key, || {
            self.run_compile_blocking(move || build_cache_entry(&original_owned, &passes))
        });

        InstrumentedShader { bytes: entry.bytes, feature_mask }
    }

    fn run_compile_blocking<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> T {
        match self.worker_pool.lock().as_ref() {
            Some(pool) => pool.run_blocking(f),
            None => f(),
        }
    }

    /// §9 "a device-destroy drains its worker pool before removing the
    /// entry". Safe to call more than once; a drained pool just falls back
    /// to synchronous execution for any compile still in flight through
    /// this device (there shouldn't be one by device-destroy time, but
    /// nothing else here enforces that).
    pub fn drain_worker_pool(&self) {
        self.worker_pool.lock().take();
    }

    /// Fills every active pass's push-constant dwords ahead of one
    /// draw/dispatch (§4.5 `UpdatePushConstants`), keyed by the push-constant
    /// uid each pass claimed at registration so the caller can splice each
    /// range into the native push-constant buffer at the offset
    /// [`crate::layout::append_push_constant_ranges`] assigned it. Returns
    /// the invocation-shared id used for this call, for callers (tests)
    /// that want to correlate it with a later error record.
    pub fn update_push_constants(&self) -> (u32, HashMap<u16, Vec<u8>>) {
        let invocation_id = (self.invocation_counter.fetch_add(1, Ordering::Relaxed) & u32::MAX as u64) as u32;
        let passes = self.active_passes();
        let mut per_pass = HashMap::new();
        for pass in &passes {
            let dword_count: u32 = pass.enumerate_push_constants().iter().map(|decl| decl.dword_count).sum();
            let mut data = vec![0u8; (dword_count * 4) as usize];
            let mut ctx = PushConstantCtx { invocation_shared_id: invocation_id, data: &mut data };
            pass.update_push_constants(&mut ctx);
            per_pass.insert(pass.uids().push_constant_uid, data);
        }
        (invocation_id, per_pass)
    }

    pub fn is_report_open(&self) -> bool {
        self.report.lock().is_open()
    }

    pub fn stream_count(&self) -> usize {
        self.ring.stream_count()
    }

    /// Simulates one guard-code write into the message ring, for driving a
    /// report end-to-end without real GPU execution (§8 S1/S2 use exactly
    /// this: "a test dispatch" standing in for the device).
    pub fn inject_ring_record(&self, stream_id: usize, record: gvl_core::ErrorRecord) -> bool {
        self.ring.record(stream_id, record.pack())
    }

    pub fn begin_report(&self) {
        self.report.lock().begin_report();
    }

    pub fn end_step(&self) {
        self.report.lock().end_step();
    }

    pub fn end_report(&self) -> Report {
        let mut passes = self.active_passes();
        self.report.lock().end_report(&mut passes)
    }

    pub fn force_serialize_cache(&self) -> gvl_cache::Result<()> {
        self.shader_cache.serialize_now()
    }
}

fn build_cache_entry(original: &[u8], passes: &[Box<dyn Pass>]) -> CacheEntry {
    match gvl_backend::instrument_container(original, passes) {
        Ok(result) => CacheEntry::new(result.bytes),
        Err(err) => {
            log::warn!("gvl-layer: instrumentation failed, falling back to passthrough: {err}");
            match gvl_backend::passthrough(original) {
                Ok(bytes) => CacheEntry::new(bytes),
                Err(err) => {
                    log::error!("gvl-layer: passthrough re-emit also failed, shipping original bytes verbatim: {err}");
                    CacheEntry::new(original.to_vec())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_enables_only_resource_bounds() {
        let device = DeviceState::new(LayerConfig::default());
        assert_eq!(device.active_features(), FeatureFlags::RESOURCE_BOUNDS);
        assert_eq!(device.active_passes().len(), 1);
    }

    #[test]
    fn empty_feature_set_yields_no_active_passes() {
        let device = DeviceState::new(LayerConfig { features: FeatureFlags::empty(), ..Default::default() });
        assert!(device.active_passes().is_empty());
    }

    #[test]
    fn change_feature_set_updates_the_active_mask() {
        let device = DeviceState::new(LayerConfig { features: FeatureFlags::RESOURCE_BOUNDS, ..Default::default() });
        device.change_feature_set(FeatureFlags::RESOURCE_BOUNDS | FeatureFlags::DATA_RACE);
        assert_eq!(device.active_passes().len(), 2);
    }

    #[test]
    fn update_push_constants_advances_the_invocation_id_every_call() {
        let device = DeviceState::new(LayerConfig { features: FeatureFlags::DATA_RACE, ..Default::default() });
        let (first, _) = device.update_push_constants();
        let (second, _) = device.update_push_constants();
        assert_ne!(first, second);
    }
}
