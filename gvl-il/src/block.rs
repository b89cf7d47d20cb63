use crate::ids::BlockId;
use crate::instruction::Instruction;

/// Structured-control metadata for a block, kept as a side annotation rather
/// than an inline pseudo-instruction -- selection/loop merge targets don't
/// produce a value and would otherwise need special-casing in every pass
/// that walks `instructions` looking for real work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StructuredAnnotation {
    pub merge_block: Option<BlockId>,
    pub continue_block: Option<BlockId>,
    pub is_loop_header: bool,
}

impl StructuredAnnotation {
    pub fn none() -> Self {
        StructuredAnnotation::default()
    }

    pub fn selection_merge(merge_block: BlockId) -> Self {
        StructuredAnnotation {
            merge_block: Some(merge_block),
            continue_block: None,
            is_loop_header: false,
        }
    }

    pub fn loop_merge(merge_block: BlockId, continue_block: BlockId) -> Self {
        StructuredAnnotation {
            merge_block: Some(merge_block),
            continue_block: Some(continue_block),
            is_loop_header: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub annotation: StructuredAnnotation,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            instructions: Vec::new(),
            annotation: StructuredAnnotation::none(),
        }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.opcode.is_terminator())
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }

    /// Successors as referenced by the terminator's operands. Branch /
    /// conditional-branch / switch targets are block ids stored as the last
    /// N operands by convention of the front-ends.
    pub fn successors(&self) -> Vec<BlockId> {
        let Some(term) = self.terminator() else {
            return Vec::new();
        };
        match term.opcode {
            crate::opcode::Opcode::Branch => term.operands.iter().copied().collect(),
            crate::opcode::Opcode::BranchConditional => term.operands.iter().skip(1).copied().collect(),
            crate::opcode::Opcode::Switch => term.operands.iter().skip(1).copied().collect(),
            _ => Vec::new(),
        }
    }
}
