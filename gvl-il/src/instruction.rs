use smallvec::SmallVec;

use crate::ids::{TypeId, ValueId};
use crate::opcode::Opcode;
use crate::span::SourceSpan;

/// Inline capacity of 4 covers the overwhelming majority of operand lists
/// (binary ops, loads, branches) without spilling to the heap.
pub type OperandList = SmallVec<[ValueId; 4]>;

#[derive(Clone, Debug)]
pub struct Instruction {
    pub result: ValueId,
    pub opcode: Opcode,
    pub result_type: TypeId,
    pub operands: OperandList,
    /// Raw literal words carried alongside operand value references --
    /// switch-case values, unexposed-opcode payload, atomic op kind, etc.
    pub immediates: SmallVec<[u64; 2]>,
    pub span: SourceSpan,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction {
            result: ValueId::INVALID,
            opcode,
            result_type: TypeId::INVALID,
            operands: OperandList::new(),
            immediates: SmallVec::new(),
            span: SourceSpan::UNKNOWN,
        }
    }

    pub fn with_result(mut self, result: ValueId, result_type: TypeId) -> Self {
        self.result = result;
        self.result_type = result_type;
        self
    }

    pub fn with_operands(mut self, operands: impl IntoIterator<Item = ValueId>) -> Self {
        self.operands = operands.into_iter().collect();
        self
    }

    pub fn with_immediates(mut self, immediates: impl IntoIterator<Item = u64>) -> Self {
        self.immediates = immediates.into_iter().collect();
        self
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.opcode, Opcode::Phi)
    }
}
