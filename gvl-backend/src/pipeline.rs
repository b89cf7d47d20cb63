use std::collections::HashSet;

use gvl_il::{BlockId, Program};
use gvl_passes::{LocationRegistry, Pass};

/// Result of one [`PassPipeline::run`] call: the location registry built up
/// across every pass (needed by the caller to decode span-GUIDs later) and
/// the set of blocks at least one pass actually touched, tracked purely for
/// diagnostics and the "zero instrumentable sites -> zero injected
/// instructions" boundary check (§8) -- it plays no part in emission, since
/// [`crate::lower::lower`] always regenerates a function's blocks from
/// scratch rather than splicing by block id.
#[derive(Default)]
pub struct PipelineReport {
    pub locations: LocationRegistry,
    pub touched_blocks: HashSet<BlockId>,
    /// Per-pass count of functions it was skipped for due to a rewrite
    /// error (§7 "pass-rewrite error"), keyed by feature-id.
    pub skipped: Vec<(u16, usize)>,
}

/// Runs the ordered chain of enabled passes over `program` (§4.6 "Rewrite
/// phase"). Passes run in registration order; for each pass, every function
/// in the program is visited in turn. A pass that fails to rewrite one
/// function is skipped for that function only -- the rest of the program,
/// and every other pass, still runs (§7 propagation policy: "the pass is
/// skipped for that shader; other passes proceed").
pub struct PassPipeline<'a> {
    passes: &'a [Box<dyn Pass>],
}

impl<'a> PassPipeline<'a> {
    pub fn new(passes: &'a [Box<dyn Pass>]) -> Self {
        PassPipeline { passes }
    }

    pub fn run(&self, program: &mut Program) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut skipped_counts = std::collections::HashMap::new();

        for pass in self.passes {
            // Analyses are recomputed on demand from `program` by whichever
            // pass needs them (dominator/loop/user/propagation all take a
            // `&Function` and build fresh state); there is no persistent
            // cache here for a pass boundary to invalidate.
            let function_count = program.functions.len();
            for function_index in 0..function_count {
                let before = program.functions[function_index].blocks.len();
                match pass.rewrite_function(program, function_index, &mut report.locations) {
                    Ok(()) => {
                        let after_blocks = &program.functions[function_index].blocks;
                        if after_blocks.len() != before {
                            for block in after_blocks {
                                report.touched_blocks.insert(block.id);
                            }
                        }
                    }
                    Err(err) => {
                        log::warn!(
                            "pass {:#06x} could not rewrite function {}: {}",
                            pass.feature_id(),
                            function_index,
                            err
                        );
                        *skipped_counts.entry(pass.feature_id()).or_insert(0usize) += 1;
                    }
                }
            }
        }

        report.skipped = skipped_counts.into_iter().collect();
        report
    }
}
