use bitflags::bitflags;

bitflags! {
    /// Feature-enable bits carried in the device-create configuration
    /// structure (§6). Each bit corresponds to one registered [C5] pass.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u32 {
        const RESOURCE_BOUNDS = 0b0000_0001;
        const RESOURCE_INITIALIZATION = 0b0000_0010;
        const DATA_RACE = 0b0000_0100;
        const DESCRIPTOR_VALIDITY = 0b0000_1000;
    }
}

bitflags! {
    /// Shader-stage visibility mask for a pipeline-layout's push-constant
    /// ranges and a descriptor-set-layout's bindings (§4.7, §9's stage-range
    /// synthesis predicate).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        const VERTEX = 0b0000_0001;
        const FRAGMENT = 0b0000_0010;
        const COMPUTE = 0b0000_0100;
        const GEOMETRY = 0b0000_1000;
        const TESSELLATION_CONTROL = 0b0001_0000;
        const TESSELLATION_EVALUATION = 0b0010_0000;
    }
}

impl StageFlags {
    pub const GRAPHICS: StageFlags = StageFlags::VERTEX
        .union(StageFlags::FRAGMENT)
        .union(StageFlags::GEOMETRY)
        .union(StageFlags::TESSELLATION_CONTROL)
        .union(StageFlags::TESSELLATION_EVALUATION);

    /// §9's open question: "the exact set of stages that require synthetic
    /// empty ranges is non-obviously tied to the original ranges' stage
    /// flags". Resolved here as one explicit, testable predicate: a stage
    /// needs a synthetic empty push-constant range appended for it whenever
    /// the pipeline-layout's original ranges don't already cover it but the
    /// pipeline *could* execute that stage (i.e. it's a graphics stage and
    /// the layout has any graphics range, or it's compute and the layout is
    /// a compute layout). This keeps every stage's push-constant layout
    /// offset identical across pipelines that enable a different subset of
    /// the layer's features, which is the property the back-end instrument
    /// rewrite actually depends on.
    pub fn needs_synthetic_range(self, original_ranges: StageFlags, is_compute: bool) -> bool {
        if is_compute {
            return self.contains(StageFlags::COMPUTE) && !original_ranges.contains(StageFlags::COMPUTE);
        }
        self.intersects(StageFlags::GRAPHICS) && !original_ranges.contains(self)
    }
}

/// Log severity, paired with the layer's log callback and severity mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

/// Device-create configuration, mirroring the dedicated extension struct
/// described in §6: everything the layer needs before it can populate a
/// dispatch table and start instrumenting shaders.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    /// Messages below this severity are dropped before reaching the log
    /// callback.
    pub log_severity_mask: Severity,
    /// Default per-command-buffer message count (ring capacity, §4.9/§9).
    pub default_message_count: u32,
    /// Hard upper limit on per-command-buffer message count.
    pub max_message_count: u32,
    /// Shader/pipeline compiler worker count. 0 = synchronous (§5).
    pub compiler_worker_count: usize,
    /// Optional on-disk path for the shader/pipeline cache (C8).
    pub cache_path: Option<std::path::PathBuf>,
    pub async_transfer: bool,
    /// Auto-serialisation triggers: after this many new cache entries...
    pub cache_serialize_entry_threshold: usize,
    /// ...or this many seconds since the last serialisation, whichever
    /// comes first.
    pub cache_serialize_interval_secs: u64,
    pub throttle_threshold: u32,
    pub features: FeatureFlags,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            log_severity_mask: Severity::Warning,
            default_message_count: 4096,
            max_message_count: 65536,
            compiler_worker_count: 0,
            cache_path: None,
            async_transfer: false,
            cache_serialize_entry_threshold: 256,
            cache_serialize_interval_secs: 30,
            throttle_threshold: 1024,
            features: FeatureFlags::RESOURCE_BOUNDS,
        }
    }
}
