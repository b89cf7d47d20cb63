pub mod analysis;
pub mod block;
pub mod constant;
pub mod function;
pub mod ids;
pub mod instruction;
pub mod opcode;
pub mod program;
pub mod span;
pub mod types;

pub use block::{BasicBlock, StructuredAnnotation};
pub use constant::{Constant, ConstantPool};
pub use function::{Function, Parameter};
pub use ids::{BlockId, ConstantId, TypeId, ValueId};
pub use instruction::{Instruction, OperandList};
pub use opcode::Opcode;
pub use program::{Program, VerifyError};
pub use span::SourceSpan;
pub use types::{AddressSpace, Type, TypeMap};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DominatorTree, PropagationEngine, UserAnalysis};

    fn straight_line_program() -> Program {
        let mut program = Program::new();
        let i32_ty = program.types.intern(Type::Int { width: 32, signed: true });
        let mut f = Function::new("main", i32_ty);

        let a = program.allocate_value();
        let b = program.allocate_value();
        let sum = program.allocate_value();

        let mut block = BasicBlock::new(BlockId(0));
        block.instructions.push(
            Instruction::new(Opcode::Literal)
                .with_result(a, i32_ty)
                .with_immediates([10])
                .with_span(SourceSpan::new(0, 32)),
        );
        block.instructions.push(
            Instruction::new(Opcode::Literal)
                .with_result(b, i32_ty)
                .with_immediates([32])
                .with_span(SourceSpan::new(32, 64)),
        );
        block.instructions.push(
            Instruction::new(Opcode::Add)
                .with_result(sum, i32_ty)
                .with_operands([a, b])
                .with_span(SourceSpan::new(64, 96)),
        );
        block.instructions.push(
            Instruction::new(Opcode::Return)
                .with_operands([sum])
                .with_span(SourceSpan::new(96, 104)),
        );
        f.blocks.push(block);
        f.entry = BlockId(0);
        program.functions.push(f);
        program
    }

    #[test]
    fn well_formed_program_passes_every_verifier() {
        let program = straight_line_program();
        assert!(program.verify_ssa().is_ok());
        assert!(program.verify_terminators().is_ok());
        assert!(program.verify_spans().is_ok());
    }

    #[test]
    fn analyses_compose_over_a_verified_function() {
        let program = straight_line_program();
        let f = &program.functions[0];
        let dominators = DominatorTree::compute(f);
        assert!(dominators.dominates(f.entry, f.entry));

        let users = UserAnalysis::compute(f);
        assert!(!users.is_unused(ValueId(0)));

        let lattice = PropagationEngine::new(f).run();
        assert_eq!(lattice.get(&ValueId(2)), Some(&crate::analysis::LatticeValue::Constant(42)));
    }
}
