use gvl_core::StageFlags;
use gvl_passes::{DescriptorBindingKind, Pass};

/// One binding in a descriptor-set-layout -- either application-declared or
/// appended by an active pass (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorBindingKind,
    pub count: u32,
    pub stages: StageFlags,
}

/// At device init the layer rewrites every descriptor-set-layout the
/// application creates by appending the bindings declared by active passes
/// (§4.7). Returns only the appended bindings, starting one past the
/// application's own highest binding slot; the caller splices these onto
/// the end of `user_bindings` when it builds the native layout.
pub fn append_diagnostic_bindings(user_bindings: &[LayoutBinding], passes: &[Box<dyn Pass>]) -> Vec<LayoutBinding> {
    let mut next_binding = user_bindings.iter().map(|b| b.binding + 1).max().unwrap_or(0);
    let mut appended = Vec::new();
    for pass in passes {
        for decl in pass.enumerate_descriptors() {
            appended.push(LayoutBinding {
                binding: next_binding,
                kind: decl.kind,
                count: decl.count,
                stages: decl.stages,
            });
            next_binding += 1;
        }
    }
    appended
}

/// The diagnostic set is always bound at `userSetCount` -- one past the
/// last application-visible set index (§4.7's "the diagnostic set is
/// always bound at userSetCount"). A named function rather than inlining
/// `user_set_count` at every call site documents that invariant once.
pub fn diagnostic_set_index(user_set_count: u32) -> u32 {
    user_set_count
}

/// One push-constant range in a pipeline-layout.
#[derive(Debug, Clone, Copy)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub stages: StageFlags,
}

/// Every stage a pipeline-layout might need a push-constant range declared
/// for, in a fixed order so synthetic-range layout stays deterministic
/// across calls (§9's stage-range synthesis predicate).
const ALL_STAGES: &[StageFlags] = &[
    StageFlags::VERTEX,
    StageFlags::FRAGMENT,
    StageFlags::GEOMETRY,
    StageFlags::TESSELLATION_CONTROL,
    StageFlags::TESSELLATION_EVALUATION,
    StageFlags::COMPUTE,
];

/// Rewrites a pipeline-layout's push-constant ranges (§4.7): first appends
/// one zero-size synthetic range for every stage [`StageFlags::needs_synthetic_range`]
/// says needs one (§9 open question, resolved there as an explicit
/// predicate), so every pipeline keeps the same per-stage push-constant
/// offsets regardless of which features are enabled; then appends each
/// active pass's real dword range (§4.5 `EnumeratePushConstants`).
pub fn append_push_constant_ranges(
    original_ranges: &[PushConstantRange],
    is_compute: bool,
    passes: &[Box<dyn Pass>],
) -> Vec<PushConstantRange> {
    let mut end_offset = original_ranges.iter().map(|r| r.offset + r.size).max().unwrap_or(0);
    let covered = original_ranges.iter().fold(StageFlags::empty(), |acc, r| acc.union(r.stages));

    let mut appended = Vec::new();
    for &stage in ALL_STAGES {
        if stage.needs_synthetic_range(covered, is_compute) {
            appended.push(PushConstantRange {
                offset: end_offset,
                size: 0,
                stages: stage,
            });
        }
    }

    for pass in passes {
        for decl in pass.enumerate_push_constants() {
            let size = decl.dword_count * 4;
            appended.push(PushConstantRange {
                offset: end_offset,
                size,
                stages: decl.stages,
            });
            end_offset += size;
        }
    }
    appended
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_set_index_is_one_past_the_last_user_set() {
        assert_eq!(diagnostic_set_index(3), 3);
        assert_eq!(diagnostic_set_index(0), 0);
    }

    #[test]
    fn appended_bindings_start_past_the_highest_user_binding() {
        let user = [LayoutBinding { binding: 4, kind: DescriptorBindingKind::UniformBuffer, count: 1, stages: StageFlags::GRAPHICS }];
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(gvl_passes::DataRacePass::new())];
        let appended = append_diagnostic_bindings(&user, &passes);
        assert!(!appended.is_empty());
        assert_eq!(appended[0].binding, 5);
    }

    #[test]
    fn a_compute_only_layout_gets_no_graphics_synthetic_ranges() {
        let appended = append_push_constant_ranges(&[], true, &[]);
        assert!(appended.iter().all(|r| r.stages == StageFlags::COMPUTE || r.stages.is_empty()));
    }

    #[test]
    fn a_fully_covered_graphics_layout_needs_no_synthetic_ranges() {
        let original = [PushConstantRange { offset: 0, size: 4, stages: StageFlags::GRAPHICS }];
        let appended = append_push_constant_ranges(&original, false, &[]);
        assert!(appended.is_empty());
    }

    #[test]
    fn active_pass_ranges_are_appended_after_any_synthetic_ranges() {
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(gvl_passes::DataRacePass::new())];
        let appended = append_push_constant_ranges(&[], false, &passes);
        assert!(!appended.is_empty());
        assert!(appended.last().unwrap().size > 0);
    }
}
