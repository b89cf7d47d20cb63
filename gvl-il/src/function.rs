use crate::block::BasicBlock;
use crate::ids::{BlockId, TypeId, ValueId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub value: ValueId,
    pub ty: TypeId,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub return_type: TypeId,
    pub parameters: Vec<Parameter>,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: TypeId) -> Self {
        Function {
            name: name.into(),
            return_type,
            parameters: Vec::new(),
            blocks: Vec::new(),
            entry: BlockId::INVALID,
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Predecessors of `target`, derived from every other block's terminator
    /// successors. O(blocks * successors); analyses that need this
    /// repeatedly should cache it (see [`crate::analysis::dominator`]).
    pub fn predecessors(&self, target: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.successors().contains(&target))
            .map(|b| b.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    #[test]
    fn predecessors_are_derived_from_terminator_successors() {
        let mut f = Function::new("main", TypeId::INVALID);
        let b0 = BlockId(0);
        let b1 = BlockId(1);
        let mut entry = BasicBlock::new(b0);
        entry.instructions.push(Instruction::new(Opcode::Branch).with_operands([b1]));
        let exit = BasicBlock::new(b1);
        f.blocks.push(entry);
        f.blocks.push(exit);
        f.entry = b0;
        assert_eq!(f.predecessors(b1), vec![b0]);
        assert!(f.predecessors(b0).is_empty());
    }
}
