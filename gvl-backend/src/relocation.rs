//! Tracks which blocks a pass pipeline touched, function by function.
//!
//! The original recompiler this crate's instrumentation model is patterned
//! after stitches a relocation stream together from per-block fragments
//! keyed by span, splicing rewritten blocks directly into the surrounding
//! bytecode without re-emitting the whole module. This crate's span model
//! (`gvl_il::SourceSpan`) is a synthetic monotonic counter rather than a true
//! bit offset into the original stream (see `gvl_frontend::module_front`'s
//! `SpanCounter`), so a byte-level splice isn't reconstructable from it --
//! [`crate::lower::lower`] regenerates every function's bytecode from its IL
//! instead. What this module keeps is the block-granularity bookkeeping a
//! caller still needs: which functions a pass pipeline actually changed, and
//! how the block count shifted, without claiming a byte-range it can't back.

use std::collections::HashMap;

use gvl_il::{BlockId, Program};

/// Per-function before/after block count, recorded once per
/// [`crate::pipeline::PassPipeline::run`] call so a caller can tell which
/// functions were left untouched (and can therefore skip re-validating
/// them) from which were rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionDelta {
    pub blocks_before: usize,
    pub blocks_after: usize,
}

impl FunctionDelta {
    pub fn is_unchanged(&self) -> bool {
        self.blocks_before == self.blocks_after
    }
}

/// A snapshot of every function's block count, taken before the pipeline
/// runs. Diffing against the program after the run yields a [`FunctionDelta`]
/// per function without the pipeline itself having to thread this through
/// every pass.
pub struct RelocationTracker {
    before: Vec<usize>,
}

impl RelocationTracker {
    pub fn snapshot(program: &Program) -> Self {
        RelocationTracker {
            before: program.functions.iter().map(|f| f.blocks.len()).collect(),
        }
    }

    /// Diffs the snapshot against `program`'s current state. Panics if
    /// `program` has a different function count than the one snapshotted --
    /// a pass pipeline never adds or removes whole functions, only rewrites
    /// their bodies.
    pub fn diff(&self, program: &Program) -> Vec<FunctionDelta> {
        assert_eq!(self.before.len(), program.functions.len());
        self.before
            .iter()
            .zip(program.functions.iter())
            .map(|(&before, function)| FunctionDelta {
                blocks_before: before,
                blocks_after: function.blocks.len(),
            })
            .collect()
    }

    /// Blocks that exist now but didn't exist at snapshot time, identified by
    /// id rather than position -- every new block a pass inserts gets a
    /// fresh id from `program.allocate_value`, so any id not present in the
    /// snapshot is necessarily new.
    pub fn new_blocks(&self, program: &Program) -> HashMap<usize, Vec<BlockId>> {
        let mut result = HashMap::new();
        for (function_index, function) in program.functions.iter().enumerate() {
            let before = self.before.get(function_index).copied().unwrap_or(0);
            if function.blocks.len() > before {
                result.insert(
                    function_index,
                    function.blocks[before..].iter().map(|b| b.id).collect(),
                );
            }
        }
        result
    }
}
