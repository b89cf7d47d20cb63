use std::collections::HashMap;

use crate::function::Function;
use crate::ids::ValueId;

/// Use-def index for one function. `users` maps a value to the result ids of
/// instructions that consume it (useful for following a def-use chain
/// forward); `use_count` counts every consuming reference including
/// terminators and stores, which have no result id of their own and so
/// can't appear in `users`. Built once per function and invalidated by the
/// pass pipeline (§6) whenever a pass mutates that function's blocks.
#[derive(Default)]
pub struct UserAnalysis {
    users: HashMap<ValueId, Vec<ValueId>>,
    use_count: HashMap<ValueId, u32>,
}

impl UserAnalysis {
    pub fn compute(function: &Function) -> Self {
        let mut users: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
        let mut use_count: HashMap<ValueId, u32> = HashMap::new();
        for block in &function.blocks {
            for inst in &block.instructions {
                for operand in &inst.operands {
                    *use_count.entry(*operand).or_insert(0) += 1;
                    if inst.result.is_valid() {
                        users.entry(*operand).or_default().push(inst.result);
                    }
                }
            }
        }
        UserAnalysis { users, use_count }
    }

    pub fn users_of(&self, value: ValueId) -> &[ValueId] {
        self.users.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn use_count_of(&self, value: ValueId) -> u32 {
        self.use_count.get(&value).copied().unwrap_or(0)
    }

    pub fn is_unused(&self, value: ValueId) -> bool {
        self.use_count_of(value) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::ids::{BlockId, TypeId};
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    #[test]
    fn users_index_tracks_every_operand_reference() {
        let mut f = Function::new("f", TypeId::INVALID);
        let mut block = BasicBlock::new(BlockId(0));
        let a = ValueId(0);
        let b = ValueId(1);
        let sum = ValueId(2);
        block.instructions.push(Instruction::new(Opcode::Literal).with_result(a, TypeId(0)));
        block.instructions.push(Instruction::new(Opcode::Literal).with_result(b, TypeId(0)));
        block.instructions.push(
            Instruction::new(Opcode::Add).with_result(sum, TypeId(0)).with_operands([a, b]),
        );
        block.instructions.push(Instruction::new(Opcode::Return).with_operands([sum]));
        f.blocks.push(block);

        let users = UserAnalysis::compute(&f);
        assert_eq!(users.users_of(a), &[sum]);
        assert_eq!(users.users_of(b), &[sum]);
        assert!(!users.is_unused(sum));
        assert!(users.users_of(sum).is_empty());
    }

    #[test]
    fn value_never_referenced_is_unused() {
        let mut f = Function::new("f", TypeId::INVALID);
        let mut block = BasicBlock::new(BlockId(0));
        let dead = ValueId(0);
        block.instructions.push(Instruction::new(Opcode::Literal).with_result(dead, TypeId(0)));
        block.instructions.push(Instruction::new(Opcode::Return));
        f.blocks.push(block);
        let users = UserAnalysis::compute(&f);
        assert!(users.is_unused(dead));
    }
}
