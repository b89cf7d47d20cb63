use std::collections::HashSet;

use crate::analysis::dominator::DominatorTree;
use crate::function::Function;
use crate::ids::BlockId;

/// A natural loop identified by its header and the set of blocks in its
/// body, derived from back-edges (an edge `n -> h` where `h` dominates
/// `n`) rather than the front-end's loop-merge annotation -- the
/// annotation records the *shader author's* loop-merge target, which
/// survives rewriting, but pass-inserted blocks (bounds-check guards,
/// error paths) need the structural loop body recomputed post-rewrite.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: BlockId,
    pub body: HashSet<BlockId>,
}

impl NaturalLoop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }
}

pub struct LoopAnalysis {
    pub loops: Vec<NaturalLoop>,
}

impl LoopAnalysis {
    pub fn compute(function: &Function, dominators: &DominatorTree) -> Self {
        let mut loops = Vec::new();
        for block in &function.blocks {
            for succ in block.successors() {
                if dominators.dominates(succ, block.id) {
                    loops.push(build_natural_loop(function, succ, block.id));
                }
            }
        }
        LoopAnalysis { loops }
    }

    pub fn loop_containing(&self, block: BlockId) -> Option<&NaturalLoop> {
        // Innermost match first: smallest body containing the block.
        self.loops
            .iter()
            .filter(|l| l.contains(block))
            .min_by_key(|l| l.body.len())
    }

    pub fn is_loop_header(&self, block: BlockId) -> bool {
        self.loops.iter().any(|l| l.header == block)
    }
}

fn build_natural_loop(function: &Function, header: BlockId, latch: BlockId) -> NaturalLoop {
    let mut body = HashSet::new();
    body.insert(header);
    body.insert(latch);
    let mut worklist = vec![latch];
    while let Some(node) = worklist.pop() {
        for pred in function.predecessors(node) {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    NaturalLoop { header, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::ids::{TypeId, ValueId};
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    fn single_loop() -> Function {
        // entry -> header -> (body -> header | exit)
        let mut f = Function::new("f", TypeId::INVALID);
        let entry = BlockId(0);
        let header = BlockId(1);
        let body = BlockId(2);
        let exit = BlockId(3);

        let mut entry_blk = BasicBlock::new(entry);
        entry_blk.instructions.push(Instruction::new(Opcode::Branch).with_operands([header]));
        let mut header_blk = BasicBlock::new(header);
        header_blk.instructions.push(
            Instruction::new(Opcode::BranchConditional).with_operands([ValueId(9), body, exit]),
        );
        let mut body_blk = BasicBlock::new(body);
        body_blk.instructions.push(Instruction::new(Opcode::Branch).with_operands([header]));
        let mut exit_blk = BasicBlock::new(exit);
        exit_blk.instructions.push(Instruction::new(Opcode::Return));

        f.blocks.push(entry_blk);
        f.blocks.push(header_blk);
        f.blocks.push(body_blk);
        f.blocks.push(exit_blk);
        f.entry = entry;
        f
    }

    #[test]
    fn back_edge_from_body_to_header_forms_a_natural_loop() {
        let f = single_loop();
        let dominators = DominatorTree::compute(&f);
        let loops = LoopAnalysis::compute(&f, &dominators);
        assert_eq!(loops.loops.len(), 1);
        assert!(loops.is_loop_header(BlockId(1)));
        assert!(loops.loop_containing(BlockId(2)).is_some());
        assert!(loops.loop_containing(BlockId(0)).is_none());
        assert!(loops.loop_containing(BlockId(3)).is_none());
    }
}
