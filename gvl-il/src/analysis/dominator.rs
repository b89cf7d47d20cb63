use std::collections::HashMap;

use crate::function::Function;
use crate::ids::BlockId;

/// Dominator tree computed with the standard iterative data-flow algorithm
/// (Cooper, Harvey & Kennedy) over reverse post-order -- no need for the
/// O(n log n) Lengauer-Tarjan machinery at the block counts these shaders
/// produce.
pub struct DominatorTree {
    /// Immediate dominator of each block, keyed by block id. The entry
    /// block dominates itself and has no entry here.
    idom: HashMap<BlockId, BlockId>,
    entry: BlockId,
}

fn reverse_post_order(function: &Function) -> Vec<BlockId> {
    let mut visited = std::collections::HashSet::new();
    let mut post_order = Vec::new();
    fn visit(
        function: &Function,
        id: BlockId,
        visited: &mut std::collections::HashSet<BlockId>,
        post_order: &mut Vec<BlockId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        if let Some(block) = function.block(id) {
            for succ in block.successors() {
                visit(function, succ, visited, post_order);
            }
        }
        post_order.push(id);
    }
    visit(function, function.entry, &mut visited, &mut post_order);
    post_order.reverse();
    post_order
}

impl DominatorTree {
    pub fn compute(function: &Function) -> Self {
        let rpo = reverse_post_order(function);
        let position: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(function.entry, function.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &id in rpo.iter().skip(1) {
                let preds = function.predecessors(id);
                let mut new_idom: Option<BlockId> = None;
                for pred in preds {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(current, pred, &idom, &position),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&id) != Some(&new_idom) {
                        idom.insert(id, new_idom);
                        changed = true;
                    }
                }
            }
        }

        idom.remove(&function.entry);
        DominatorTree { idom, entry: function.entry }
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == self.entry {
            return true;
        }
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(idom) = self.immediate_dominator(current) {
            if idom == a {
                return true;
            }
            if idom == current {
                return false;
            }
            current = idom;
        }
        false
    }
}

fn intersect(
    a: BlockId,
    b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    position: &HashMap<BlockId, usize>,
) -> BlockId {
    let mut finger1 = a;
    let mut finger2 = b;
    while finger1 != finger2 {
        while position[&finger1] > position[&finger2] {
            finger1 = idom[&finger1];
        }
        while position[&finger2] > position[&finger1] {
            finger2 = idom[&finger2];
        }
    }
    finger1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::ids::{TypeId, ValueId};
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    fn diamond() -> Function {
        // entry -> (left, right) -> merge -> ret
        let mut f = Function::new("f", TypeId::INVALID);
        let entry = BlockId(0);
        let left = BlockId(1);
        let right = BlockId(2);
        let merge = BlockId(3);

        let mut entry_blk = BasicBlock::new(entry);
        entry_blk.instructions.push(
            Instruction::new(Opcode::BranchConditional).with_operands([ValueId(9), left, right]),
        );
        let mut left_blk = BasicBlock::new(left);
        left_blk.instructions.push(Instruction::new(Opcode::Branch).with_operands([merge]));
        let mut right_blk = BasicBlock::new(right);
        right_blk.instructions.push(Instruction::new(Opcode::Branch).with_operands([merge]));
        let mut merge_blk = BasicBlock::new(merge);
        merge_blk.instructions.push(Instruction::new(Opcode::Return));

        f.blocks.push(entry_blk);
        f.blocks.push(left_blk);
        f.blocks.push(right_blk);
        f.blocks.push(merge_blk);
        f.entry = entry;
        f
    }

    #[test]
    fn entry_dominates_every_block() {
        let f = diamond();
        let tree = DominatorTree::compute(&f);
        for block in &f.blocks {
            assert!(tree.dominates(f.entry, block.id));
        }
    }

    #[test]
    fn merge_block_immediate_dominator_is_entry_not_a_branch_arm() {
        let f = diamond();
        let tree = DominatorTree::compute(&f);
        assert_eq!(tree.immediate_dominator(BlockId(3)), Some(BlockId(0)));
    }

    #[test]
    fn branch_arms_do_not_dominate_each_other() {
        let f = diamond();
        let tree = DominatorTree::compute(&f);
        assert!(!tree.dominates(BlockId(1), BlockId(2)));
        assert!(!tree.dominates(BlockId(2), BlockId(1)));
    }
}
