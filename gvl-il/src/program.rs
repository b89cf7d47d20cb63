use std::collections::HashSet;

use thiserror::Error;

use crate::constant::ConstantPool;
use crate::function::Function;
use crate::ids::ValueId;
use crate::types::TypeMap;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("value {0:?} redefined within function {1:?}")]
    DuplicateResult(ValueId, String),
    #[error("block {0:?} in function {1:?} has no terminator")]
    MissingTerminator(ValueId, String),
    #[error("block {0:?} in function {1:?} has a non-terminating instruction after its terminator")]
    InstructionAfterTerminator(ValueId, String),
    #[error("instruction producing {0:?} in function {1:?} has an unknown source span")]
    UnknownSpan(ValueId, String),
}

/// A program is the unit the front-ends (§5) produce and the back-end (§6)
/// consumes: one global id space shared by every function, plus the
/// interned type and constant tables referenced from it.
#[derive(Default)]
pub struct Program {
    pub types: TypeMap,
    pub constants: ConstantPool,
    pub functions: Vec<Function>,
    next_value: u32,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// No two instructions across the whole program may share a result id --
    /// front-ends allocate from [`Program::allocate_value`] precisely so SSA
    /// form holds globally, not just per-function.
    pub fn verify_ssa(&self) -> Result<(), VerifyError> {
        let mut seen = HashSet::new();
        for function in &self.functions {
            for block in &function.blocks {
                for inst in &block.instructions {
                    if !inst.result.is_valid() {
                        continue;
                    }
                    if !seen.insert(inst.result) {
                        return Err(VerifyError::DuplicateResult(inst.result, function.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Every block must end in exactly one terminator, as its final
    /// instruction (§3 "basic block").
    pub fn verify_terminators(&self) -> Result<(), VerifyError> {
        for function in &self.functions {
            for block in &function.blocks {
                match block.instructions.last() {
                    None => return Err(VerifyError::MissingTerminator(block.id, function.name.clone())),
                    Some(last) => {
                        if !last.opcode.is_terminator() {
                            return Err(VerifyError::MissingTerminator(block.id, function.name.clone()));
                        }
                        if block.instructions[..block.instructions.len() - 1]
                            .iter()
                            .any(|i| i.opcode.is_terminator())
                        {
                            return Err(VerifyError::InstructionAfterTerminator(
                                block.id,
                                function.name.clone(),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Every instruction must carry a resolvable source span so the back-end
    /// relocation stream (§6) can place it. Called only on IL lifted
    /// straight from a front-end, before any pass introduces synthesized
    /// instructions (those use [`crate::span::SourceSpan::UNKNOWN`] on
    /// purpose and are exempted by the pass pipeline, not here).
    pub fn verify_spans(&self) -> Result<(), VerifyError> {
        for function in &self.functions {
            for block in &function.blocks {
                for inst in &block.instructions {
                    if !inst.span.is_known() {
                        return Err(VerifyError::UnknownSpan(inst.result, function.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BasicBlock;
    use crate::ids::{BlockId, TypeId};
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;
    use crate::span::SourceSpan;

    fn function_with_single_return(id: ValueId) -> Function {
        let mut f = Function::new("f", TypeId::INVALID);
        let mut block = BasicBlock::new(BlockId(0));
        block.instructions.push(
            Instruction::new(Opcode::Literal)
                .with_result(id, TypeId(0))
                .with_span(SourceSpan::new(0, 8)),
        );
        block.instructions.push(Instruction::new(Opcode::Return).with_span(SourceSpan::new(8, 16)));
        f.blocks.push(block);
        f.entry = BlockId(0);
        f
    }

    #[test]
    fn duplicate_result_ids_across_functions_fail_ssa_check() {
        let mut program = Program::new();
        program.functions.push(function_with_single_return(ValueId(1)));
        program.functions.push(function_with_single_return(ValueId(1)));
        assert!(matches!(program.verify_ssa(), Err(VerifyError::DuplicateResult(_, _))));
    }

    #[test]
    fn block_without_terminator_is_rejected() {
        let mut program = Program::new();
        let mut f = Function::new("f", TypeId::INVALID);
        f.blocks.push(BasicBlock::new(BlockId(0)));
        program.functions.push(f);
        assert!(matches!(program.verify_terminators(), Err(VerifyError::MissingTerminator(_, _))));
    }

    #[test]
    fn well_formed_function_passes_all_checks() {
        let mut program = Program::new();
        program.functions.push(function_with_single_return(ValueId(0)));
        assert!(program.verify_ssa().is_ok());
        assert!(program.verify_terminators().is_ok());
        assert!(program.verify_spans().is_ok());
    }
}
