use std::collections::HashSet;

use gvl_il::{BasicBlock, BlockId, Function, Instruction, Opcode, SourceSpan, TypeId, ValueId};

/// Everything [`guard_instruction`] needs to build the guarded site's two
/// new blocks: the boolean value that is true when the access is safe, the
/// operand [`Opcode::Export`] carries as the error record's
/// feature-specific payload, and -- for an access that produces a value --
/// the `(result, type)` pair the post-block's merge phi folds a safe
/// default into.
pub struct GuardSpec {
    pub predicate: ValueId,
    pub payload: ValueId,
    pub feature_id: u16,
    pub span_guid: u32,
    pub result: Option<(ValueId, TypeId)>,
}

/// Fresh ids the caller must have pre-allocated from the owning
/// [`gvl_il::Program`] -- a pass only ever holds a `&mut Function`, never
/// the program's id counter, so it can't mint its own. `default_value` and
/// `phi_result` are only consumed when [`GuardSpec::result`] is `Some`.
pub struct GuardIds {
    pub post: BlockId,
    pub error: BlockId,
    pub default_value: ValueId,
    pub phi_result: ValueId,
}

/// Result of splitting one block around an instrumented instruction.
pub struct SplitBlocks {
    pub pre: BlockId,
    pub error: BlockId,
    pub post: BlockId,
}

/// The general rewrite shape every §4.5 pass follows: split `function`'s
/// block at `block_index` just after the instruction at `inst_index`,
/// insert an error-block that emits the guard's error record, and
/// conditionally branch around it on `spec.predicate` (post-block on
/// success, error-block on failure). When the instrumented instruction
/// produces a value, every later use of that value is rewired to a phi in
/// the post-block merging the real result against a safe zero default from
/// the error path -- "returns a safe default" (§1) implemented as one SSA
/// merge rather than a value actually being replaced at the access site.
/// Also repatches every other block's structured-CFG marker (selection
/// merge / loop continue) that named the split block, per
/// [`repatch_structured_annotations`] -- §4.4's "every user instruction ...
/// must be rewritten to refer to the new block".
///
/// `inst_index` must name a non-terminator instruction.
pub fn guard_instruction(
    function: &mut Function,
    block_index: usize,
    inst_index: usize,
    spec: GuardSpec,
    ids: GuardIds,
) -> SplitBlocks {
    let mut original = function.blocks.remove(block_index);
    debug_assert!(inst_index < original.instructions.len());
    debug_assert!(!original.instructions[inst_index].opcode.is_terminator());

    let tail = original.instructions.split_off(inst_index + 1);
    let pre_id = original.id;

    let mut pre = BasicBlock::new(pre_id);
    pre.instructions = original.instructions;
    pre.annotation = original.annotation;
    pre.instructions.push(
        Instruction::new(Opcode::BranchConditional)
            .with_operands([spec.predicate, ids.post, ids.error])
            .with_span(SourceSpan::UNKNOWN),
    );

    let mut error_block = BasicBlock::new(ids.error);
    if let Some((_, result_ty)) = spec.result {
        error_block.instructions.push(
            Instruction::new(Opcode::Literal)
                .with_result(ids.default_value, result_ty)
                .with_immediates([0])
                .with_span(SourceSpan::UNKNOWN),
        );
    }
    error_block.instructions.push(
        Instruction::new(Opcode::Export)
            .with_operands([spec.payload])
            .with_immediates([spec.feature_id as u64, spec.span_guid as u64])
            .with_span(SourceSpan::UNKNOWN),
    );
    error_block
        .instructions
        .push(Instruction::new(Opcode::Branch).with_operands([ids.post]).with_span(SourceSpan::UNKNOWN));

    let mut post = BasicBlock::new(ids.post);
    post.instructions = tail;
    if let Some((result, result_ty)) = spec.result {
        post.instructions.insert(
            0,
            Instruction::new(Opcode::Phi)
                .with_result(ids.phi_result, result_ty)
                .with_operands([result, ids.default_value])
                .with_span(SourceSpan::UNKNOWN),
        );
    }

    function.blocks.insert(block_index, pre);
    function.blocks.insert(block_index + 1, error_block);
    function.blocks.insert(block_index + 2, post);

    repatch_structured_annotations(function, pre_id, ids.post);

    if let Some((result, _)) = spec.result {
        substitute_uses(function, result, ids.phi_result, ids.phi_result);
    }

    SplitBlocks { pre: pre_id, error: ids.error, post: ids.post }
}

/// §4.4's loop-continue / selection-merge post-patching, with the "when is
/// a marker applicable" predicate (left implicit in the source, per §9's
/// open question) made explicit: **a structured-CFG marker is applicable
/// for repatching iff its `merge_block` or `continue_block` names the split
/// block itself** (`split`, i.e. `pre`'s id -- stable across the split,
/// since `pre` keeps the original block's id).
///
/// Branch targets and phi predecessors naming `split` stay correct for
/// free, because `pre` keeps the original id and is still the block
/// control flow enters. A structured-CFG marker is different: it doesn't
/// name an entry point, it names "the block where this construct's real
/// control flow resumes" -- and that real control flow (the original
/// tail instructions and terminator) now lives in the freshly split-off
/// `post` block, since `pre` holds only the injected guard dispatch.
/// So every OTHER block's marker naming `split` is rewritten to name
/// `post` instead; a marker naming some unrelated block is left alone.
fn repatch_structured_annotations(function: &mut Function, split: BlockId, post: BlockId) {
    for block in &mut function.blocks {
        if block.annotation.merge_block == Some(split) {
            block.annotation.merge_block = Some(post);
        }
        if block.annotation.continue_block == Some(split) {
            block.annotation.continue_block = Some(post);
        }
    }
}

/// Replaces every operand reference to `old` with `new` across the whole
/// function, except inside the instruction whose own result is `skip` (the
/// merge phi itself, which must keep referencing the real value on its
/// "safe" incoming edge).
fn substitute_uses(function: &mut Function, old: ValueId, new: ValueId, skip: ValueId) {
    for block in &mut function.blocks {
        for inst in &mut block.instructions {
            if inst.result == skip {
                continue;
            }
            for operand in &mut inst.operands {
                if *operand == old {
                    *operand = new;
                }
            }
        }
    }
}

/// Finds the first instruction satisfying `matches` whose result id (if
/// any) is not already in `instrumented`. Passes drive their rewrite loop
/// by calling this repeatedly after each [`guard_instruction`] call, since
/// splitting a block invalidates every later `(block_index, inst_index)`
/// pair computed before the split.
pub fn find_site(
    function: &Function,
    instrumented: &HashSet<ValueId>,
    matches: impl Fn(&Instruction) -> bool,
) -> Option<(usize, usize)> {
    for (block_index, block) in function.blocks.iter().enumerate() {
        for (inst_index, inst) in block.instructions.iter().enumerate() {
            if matches(inst) && !instrumented.contains(&inst.result) {
                return Some((block_index, inst_index));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvl_il::{Function, Opcode, StructuredAnnotation, TypeId};

    #[test]
    fn splitting_preserves_instruction_order_across_the_three_blocks() {
        let mut f = Function::new("f", TypeId::INVALID);
        let mut block = BasicBlock::new(BlockId(0));
        let loaded = ValueId(10);
        block.instructions.push(
            Instruction::new(Opcode::LoadBuffer).with_result(loaded, TypeId(0)).with_operands([ValueId(1), ValueId(2)]),
        );
        block.instructions.push(Instruction::new(Opcode::Return).with_operands([loaded]));
        f.blocks.push(block);
        f.entry = BlockId(0);

        let spec = GuardSpec {
            predicate: ValueId(50),
            payload: loaded,
            feature_id: 1,
            span_guid: 7,
            result: Some((loaded, TypeId(0))),
        };
        let ids = GuardIds {
            post: BlockId(100),
            error: BlockId(101),
            default_value: ValueId(102),
            phi_result: ValueId(103),
        };
        let split = guard_instruction(&mut f, 0, 0, spec, ids);

        assert_eq!(f.blocks.len(), 3);
        assert_eq!(split.pre, BlockId(0));
        let pre = f.block(split.pre).unwrap();
        assert!(matches!(pre.instructions.last().unwrap().opcode, Opcode::BranchConditional));
        let error_block = f.block(split.error).unwrap();
        assert!(matches!(error_block.instructions[0].opcode, Opcode::Literal));
        assert!(matches!(error_block.instructions[1].opcode, Opcode::Export));
        let post = f.block(split.post).unwrap();
        assert!(matches!(post.instructions[0].opcode, Opcode::Phi));
        // the original `Return loaded` must now return the phi's merged value.
        assert_eq!(post.instructions[1].operands.as_slice(), &[ValueId(103)]);
    }

    #[test]
    fn splitting_repatches_a_sibling_loop_markers_continue_target() {
        let mut f = Function::new("f", TypeId::INVALID);
        let split_id = BlockId(0);
        let header_id = BlockId(1);
        let unrelated_id = BlockId(2);

        let loaded = ValueId(10);
        let mut split_block = BasicBlock::new(split_id);
        split_block.instructions.push(
            Instruction::new(Opcode::LoadBuffer).with_result(loaded, TypeId(0)).with_operands([ValueId(1), ValueId(2)]),
        );
        split_block.instructions.push(Instruction::new(Opcode::Branch).with_operands([header_id]));

        let mut header_block = BasicBlock::new(header_id);
        // This loop header's continue-target names `split_id`: after the
        // split, "continuing the loop" must resume in the moved tail
        // (`post`), not the guard dispatch left behind at `split_id`.
        header_block.annotation = StructuredAnnotation::loop_merge(unrelated_id, split_id);
        header_block.instructions.push(Instruction::new(Opcode::Branch).with_operands([split_id]));

        let mut unrelated_block = BasicBlock::new(unrelated_id);
        // Names some other block entirely -- must be left untouched.
        unrelated_block.annotation = StructuredAnnotation::selection_merge(header_id);
        unrelated_block.instructions.push(Instruction::new(Opcode::Return));

        f.blocks.push(split_block);
        f.blocks.push(header_block);
        f.blocks.push(unrelated_block);
        f.entry = split_id;

        let spec = GuardSpec { predicate: ValueId(50), payload: loaded, feature_id: 1, span_guid: 7, result: None };
        let ids = GuardIds { post: BlockId(100), error: BlockId(101), default_value: ValueId(102), phi_result: ValueId(103) };
        let split = guard_instruction(&mut f, 0, 0, spec, ids);

        let header = f.block(header_id).unwrap();
        assert_eq!(header.annotation.continue_block, Some(split.post));
        assert_eq!(header.annotation.merge_block, Some(unrelated_id));

        let unrelated = f.block(unrelated_id).unwrap();
        assert_eq!(unrelated.annotation.merge_block, Some(header_id));
    }

    #[test]
    fn find_site_skips_already_instrumented_results() {
        let mut f = Function::new("f", TypeId::INVALID);
        let mut block = BasicBlock::new(BlockId(0));
        let a = ValueId(0);
        block.instructions.push(Instruction::new(Opcode::LoadBuffer).with_result(a, TypeId(0)));
        block.instructions.push(Instruction::new(Opcode::Return));
        f.blocks.push(block);

        let mut instrumented = HashSet::new();
        assert!(find_site(&f, &instrumented, |i| i.opcode.is_resource_access()).is_some());
        instrumented.insert(a);
        assert!(find_site(&f, &instrumented, |i| i.opcode.is_resource_access()).is_none());
    }
}
