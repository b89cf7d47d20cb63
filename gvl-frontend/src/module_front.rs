use std::collections::HashMap;

use gvl_bitstream::{Block, Element, Record, Stream};
use gvl_il::{
    BasicBlock, BlockId, Function, Instruction, Opcode, Program, SourceSpan, StructuredAnnotation,
    Type, TypeId, ValueId,
};

use crate::error::{FrontendError, Result};
use crate::opcodes::*;

/// A combined image+sampler value split at lift time. The backend's
/// recombine step (outside this crate) uses this table to re-emit a single
/// combined operand for any IL sampling instruction still referencing
/// `image`/`sampler` when targeting a dialect that only understands the
/// combined form.
#[derive(Debug, Clone, Copy)]
pub struct CombinedSplit {
    pub combined: ValueId,
    pub image: ValueId,
    pub sampler: ValueId,
}

pub struct LiftedModule {
    pub program: Program,
    pub combined_splits: Vec<CombinedSplit>,
}

/// Decodes a char6-packed name array (the only place this dialect uses
/// `Array` of `Char6` operands at the record level rather than via an
/// abbreviation) back into a string.
fn decode_name(operands: &[u64]) -> String {
    operands
        .iter()
        .map(|&word| gvl_bitstream::decode_char6(word as u8) as char)
        .collect()
}

/// This codec doesn't capture true bit offsets per instruction the way the
/// underlying reader could -- record spans are reconstructed here as a
/// monotonically increasing sequence scoped to the whole module rather than
/// true byte offsets into the container's bitstream chunk. Good enough to
/// satisfy every consumer that only needs spans to be stable, ordered, and
/// unique (the shader-span GUID registry, round-trip book-keeping); not
/// good enough to slice the original bytes out of a span directly.
struct SpanCounter(u64);

impl SpanCounter {
    fn next(&mut self) -> SourceSpan {
        let start = self.0;
        self.0 += 1;
        SourceSpan::new(start, start + 1)
    }
}

pub fn lift(stream: &Stream) -> Result<LiftedModule> {
    let module_block = stream
        .top_level
        .iter()
        .find(|b| b.id == BLOCK_ID_MODULE)
        .ok_or(FrontendError::DanglingBlockReference(BLOCK_ID_MODULE))?;

    let mut program = Program::new();
    let i32_ty = program.types.intern(Type::Int { width: 32, signed: true });
    let mut combined_splits = Vec::new();
    let mut spans = SpanCounter(0);

    for element in &module_block.elements {
        if let Element::SubBlock(function_block) = element {
            if function_block.id == BLOCK_ID_FUNCTION {
                let function = lift_function(function_block, &mut program, i32_ty, &mut spans, &mut combined_splits)?;
                program.functions.push(function);
            }
        }
    }

    Ok(LiftedModule { program, combined_splits })
}

fn lift_function(
    block: &Block,
    program: &mut Program,
    default_ty: TypeId,
    spans: &mut SpanCounter,
    combined_splits: &mut Vec<CombinedSplit>,
) -> Result<Function> {
    let mut name = String::from("fn");
    let mut return_type = default_ty;

    for element in &block.elements {
        if let Element::Record { record, .. } = element {
            if record.opcode == REC_FUNCTION_HEADER {
                name = decode_name(&record.operands[1..]);
                return_type = TypeId(record.operands.first().copied().unwrap_or(0) as u32);
            }
        }
    }

    let mut function = Function::new(name, return_type);
    let mut block_ids: HashMap<u32, BlockId> = HashMap::new();
    let mut next_local_block = 0u32;
    for element in &block.elements {
        if let Element::SubBlock(bb) = element {
            if bb.id == BLOCK_ID_BASIC_BLOCK {
                block_ids.insert(next_local_block, BlockId(program.allocate_value().0));
                next_local_block += 1;
            }
        }
    }

    next_local_block = 0;
    let mut first = true;
    for element in &block.elements {
        if let Element::SubBlock(bb) = element {
            if bb.id == BLOCK_ID_BASIC_BLOCK {
                let id = block_ids[&next_local_block];
                let lifted = lift_basic_block(bb, id, program, &block_ids, spans, combined_splits)?;
                if first {
                    function.entry = id;
                    first = false;
                }
                function.blocks.push(lifted);
                next_local_block += 1;
            }
        }
    }

    Ok(function)
}

fn lift_basic_block(
    block: &Block,
    id: BlockId,
    program: &mut Program,
    block_ids: &HashMap<u32, BlockId>,
    spans: &mut SpanCounter,
    combined_splits: &mut Vec<CombinedSplit>,
) -> Result<BasicBlock> {
    let mut bb = BasicBlock::new(id);
    for element in &block.elements {
        let Element::Record { record, .. } = element else { continue };
        if record.opcode == REC_FUNCTION_HEADER {
            continue;
        }
        if record.opcode == REC_SELECTION_MERGE {
            let merge = target_block(block_ids, record.operands[0])?;
            bb.annotation = StructuredAnnotation::selection_merge(merge);
            continue;
        }
        if record.opcode == REC_LOOP_MERGE {
            let merge = target_block(block_ids, record.operands[0])?;
            let cont = target_block(block_ids, record.operands[1])?;
            bb.annotation = StructuredAnnotation::loop_merge(merge, cont);
            continue;
        }
        lift_instruction(record, program, block_ids, spans, combined_splits, &mut bb)?;
    }
    Ok(bb)
}

fn target_block(block_ids: &HashMap<u32, BlockId>, raw: u64) -> Result<BlockId> {
    block_ids
        .get(&(raw as u32))
        .copied()
        .ok_or(FrontendError::DanglingBlockReference(raw as u32))
}

fn lift_instruction(
    record: &Record,
    program: &mut Program,
    block_ids: &HashMap<u32, BlockId>,
    spans: &mut SpanCounter,
    combined_splits: &mut Vec<CombinedSplit>,
    bb: &mut BasicBlock,
) -> Result<()> {
    let span = spans.next();
    let ops = &record.operands;

    macro_rules! binary {
        ($opcode:expr) => {{
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(
                Instruction::new($opcode)
                    .with_result(result, ty)
                    .with_operands([ValueId(ops[1] as u32), ValueId(ops[2] as u32)])
                    .with_span(span),
            );
        }};
    }

    match record.opcode {
        REC_LITERAL => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(
                Instruction::new(Opcode::Literal)
                    .with_result(result, ty)
                    .with_immediates([ops[1]])
                    .with_span(span),
            );
        }
        REC_ADD => binary!(Opcode::Add),
        REC_SUB => binary!(Opcode::Sub),
        REC_MUL => binary!(Opcode::Mul),
        REC_DIV => binary!(Opcode::Div),
        REC_BIT_OR => binary!(Opcode::BitOr),
        REC_BIT_AND => binary!(Opcode::BitAnd),
        REC_SHL => binary!(Opcode::BitShiftLeft),
        REC_SHR => binary!(Opcode::BitShiftRight),
        REC_AND => binary!(Opcode::And),
        REC_OR => binary!(Opcode::Or),
        REC_EQ => binary!(Opcode::Equal),
        REC_NE => binary!(Opcode::NotEqual),
        REC_LT => binary!(Opcode::LessThan),
        REC_LE => binary!(Opcode::LessThanEqual),
        REC_GT => binary!(Opcode::GreaterThan),
        REC_GE => binary!(Opcode::GreaterThanEqual),
        REC_ANY | REC_ALL => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            let operands: Vec<ValueId> = ops[1..].iter().map(|&v| ValueId(v as u32)).collect();
            let opcode = if record.opcode == REC_ANY { Opcode::Any } else { Opcode::All };
            bb.instructions.push(
                Instruction::new(opcode).with_result(result, ty).with_operands(operands).with_span(span),
            );
        }
        REC_ALLOCA => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(Instruction::new(Opcode::Alloca).with_result(result, ty).with_span(span));
        }
        REC_LOAD => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(
                Instruction::new(Opcode::Load)
                    .with_result(result, ty)
                    .with_operands([ValueId(ops[1] as u32)])
                    .with_span(span),
            );
        }
        REC_STORE => {
            bb.instructions.push(
                Instruction::new(Opcode::Store)
                    .with_operands([ValueId(ops[0] as u32), ValueId(ops[1] as u32)])
                    .with_span(span),
            );
        }
        REC_ADDRESS_CHAIN => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            let operands: Vec<ValueId> = ops[1..].iter().map(|&v| ValueId(v as u32)).collect();
            bb.instructions.push(
                Instruction::new(Opcode::AddressChain).with_result(result, ty).with_operands(operands).with_span(span),
            );
        }
        REC_LOAD_BUFFER | REC_LOAD_TEXTURE => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            let opcode = if record.opcode == REC_LOAD_BUFFER { Opcode::LoadBuffer } else { Opcode::LoadTexture };
            bb.instructions.push(
                Instruction::new(opcode)
                    .with_result(result, ty)
                    .with_operands([ValueId(ops[1] as u32), ValueId(ops[2] as u32)])
                    .with_span(span),
            );
        }
        REC_STORE_BUFFER | REC_STORE_TEXTURE => {
            let opcode = if record.opcode == REC_STORE_BUFFER { Opcode::StoreBuffer } else { Opcode::StoreTexture };
            bb.instructions.push(
                Instruction::new(opcode)
                    .with_operands([ValueId(ops[0] as u32), ValueId(ops[1] as u32), ValueId(ops[2] as u32)])
                    .with_span(span),
            );
        }
        REC_RESOURCE_SIZE => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(
                Instruction::new(Opcode::ResourceSize)
                    .with_result(result, ty)
                    .with_operands([ValueId(ops[1] as u32)])
                    .with_span(span),
            );
        }
        REC_BRANCH => {
            let target = target_block(block_ids, ops[0])?;
            bb.instructions.push(Instruction::new(Opcode::Branch).with_operands([target]).with_span(span));
        }
        REC_BRANCH_COND => {
            let cond = ValueId(ops[0] as u32);
            let then_blk = target_block(block_ids, ops[1])?;
            let else_blk = target_block(block_ids, ops[2])?;
            bb.instructions.push(
                Instruction::new(Opcode::BranchConditional)
                    .with_operands([cond, then_blk, else_blk])
                    .with_span(span),
            );
        }
        REC_SWITCH => {
            let selector = ValueId(ops[0] as u32);
            let default_blk = target_block(block_ids, ops[1])?;
            let mut operands = vec![selector, default_blk];
            let mut immediates = Vec::new();
            let mut i = 2;
            while i + 1 < ops.len() {
                immediates.push(ops[i]);
                operands.push(target_block(block_ids, ops[i + 1])?);
                i += 2;
            }
            bb.instructions.push(
                Instruction::new(Opcode::Switch)
                    .with_operands(operands)
                    .with_immediates(immediates)
                    .with_span(span),
            );
        }
        REC_PHI => {
            let ty = TypeId(ops[0] as u32);
            let result = ValueId(program.allocate_value().0);
            let mut operands = Vec::new();
            let mut i = 1;
            while i + 1 < ops.len() {
                operands.push(ValueId(ops[i] as u32));
                i += 2;
            }
            bb.instructions.push(
                Instruction::new(Opcode::Phi).with_result(result, ty).with_operands(operands).with_span(span),
            );
        }
        REC_RETURN => {
            let operands: Vec<ValueId> = ops.iter().map(|&v| ValueId(v as u32)).collect();
            bb.instructions.push(Instruction::new(Opcode::Return).with_operands(operands).with_span(span));
        }
        REC_SAMPLE_COMBINED => {
            let ty = TypeId(ops[0] as u32);
            let combined = ValueId(ops[1] as u32);
            let coord = ValueId(ops[2] as u32);
            let image = ValueId(program.allocate_value().0);
            let sampler = ValueId(program.allocate_value().0);
            // Opaque markers: no opcode folds through them, but they keep
            // `image`/`sampler` present as SSA-defined values so every
            // downstream pass can treat this exactly like two independently
            // loaded resources.
            bb.instructions.push(
                Instruction::new(Opcode::Unexposed(REC_SAMPLE_COMBINED as u32))
                    .with_result(image, ty)
                    .with_operands([combined])
                    .with_span(span),
            );
            bb.instructions.push(
                Instruction::new(Opcode::Unexposed(REC_SAMPLE_COMBINED as u32))
                    .with_result(sampler, ty)
                    .with_operands([combined])
                    .with_span(span),
            );
            let result = ValueId(program.allocate_value().0);
            bb.instructions.push(
                Instruction::new(Opcode::LoadTexture)
                    .with_result(result, ty)
                    .with_operands([image, coord])
                    .with_span(span),
            );
            combined_splits.push(CombinedSplit { combined, image, sampler });
        }
        other => {
            let operands: Vec<ValueId> = ops.iter().map(|&v| ValueId(v as u32)).collect();
            bb.instructions.push(
                Instruction::new(Opcode::Unexposed(other as u32)).with_operands(operands).with_span(span),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(opcode: u64, operands: Vec<u64>) -> Element {
        Element::Record {
            abbrev_id: gvl_bitstream::UNABBREV_RECORD,
            record: Record { opcode, operands, blob: None },
        }
    }

    // Local block numbering is purely positional: the Nth
    // `BLOCK_ID_BASIC_BLOCK` sub-block within a function is local block N,
    // matched up by `lift_function`'s own counter.
    fn basic_block(records: Vec<Element>) -> Block {
        Block { id: BLOCK_ID_BASIC_BLOCK, abbrev_width: 2, elements: records }
    }

    fn sample_stream() -> Stream {
        let entry = basic_block(vec![record(REC_LITERAL, vec![0, 10]), record(REC_BRANCH, vec![1])]);
        let exit = basic_block(vec![record(REC_RETURN, vec![])]);
        let function = Block {
            id: BLOCK_ID_FUNCTION,
            abbrev_width: 2,
            elements: vec![
                record(REC_FUNCTION_HEADER, vec![0]),
                Element::SubBlock(entry),
                Element::SubBlock(exit),
            ],
        };
        let module = Block {
            id: BLOCK_ID_MODULE,
            abbrev_width: 2,
            elements: vec![record(REC_MODULE_HEADER, vec![1]), Element::SubBlock(function)],
        };
        Stream { magic: 0xC0DE, top_level: vec![module] }
    }

    #[test]
    fn lifts_a_two_block_function_with_a_literal_and_a_branch() {
        let stream = sample_stream();
        let lifted = lift(&stream).unwrap();
        assert_eq!(lifted.program.functions.len(), 1);
        let f = &lifted.program.functions[0];
        assert_eq!(f.blocks.len(), 2);
        assert!(lifted.program.verify_ssa().is_ok());
        assert!(lifted.program.verify_terminators().is_ok());
    }

    #[test]
    fn selection_merge_marker_lifts_into_the_blocks_annotation() {
        let entry = basic_block(vec![
            record(REC_SELECTION_MERGE, vec![1]),
            record(REC_BRANCH_COND, vec![999, 1, 1]),
        ]);
        let target = basic_block(vec![record(REC_RETURN, vec![])]);
        let function = Block {
            id: BLOCK_ID_FUNCTION,
            abbrev_width: 2,
            elements: vec![
                record(REC_FUNCTION_HEADER, vec![0]),
                Element::SubBlock(entry),
                Element::SubBlock(target),
            ],
        };
        let module = Block { id: BLOCK_ID_MODULE, abbrev_width: 2, elements: vec![Element::SubBlock(function)] };
        let stream = Stream { magic: 1, top_level: vec![module] };

        let lifted = lift(&stream).unwrap();
        let f = &lifted.program.functions[0];
        let target_id = f.blocks[1].id;

        // The marker record itself must not become an instruction.
        assert!(f.blocks[0].instructions.iter().all(|i| !matches!(i.opcode, Opcode::Unexposed(code) if code as u64 == REC_SELECTION_MERGE)));
        assert_eq!(f.blocks[0].annotation.merge_block, Some(target_id));
        assert!(!f.blocks[0].annotation.is_loop_header);
        assert_eq!(f.blocks[1].annotation.merge_block, None);
    }

    #[test]
    fn loop_merge_marker_lifts_merge_and_continue_targets() {
        let header = basic_block(vec![
            record(REC_LOOP_MERGE, vec![2, 1]),
            record(REC_BRANCH, vec![1]),
        ]);
        let body = basic_block(vec![record(REC_BRANCH, vec![0])]);
        let exit = basic_block(vec![record(REC_RETURN, vec![])]);
        let function = Block {
            id: BLOCK_ID_FUNCTION,
            abbrev_width: 2,
            elements: vec![
                record(REC_FUNCTION_HEADER, vec![0]),
                Element::SubBlock(header),
                Element::SubBlock(body),
                Element::SubBlock(exit),
            ],
        };
        let module = Block { id: BLOCK_ID_MODULE, abbrev_width: 2, elements: vec![Element::SubBlock(function)] };
        let stream = Stream { magic: 1, top_level: vec![module] };

        let lifted = lift(&stream).unwrap();
        let f = &lifted.program.functions[0];
        assert_eq!(f.blocks[0].annotation.merge_block, Some(f.blocks[2].id));
        assert_eq!(f.blocks[0].annotation.continue_block, Some(f.blocks[1].id));
        assert!(f.blocks[0].annotation.is_loop_header);
    }

    #[test]
    fn unrecognized_record_codes_become_unexposed() {
        let entry = basic_block(vec![record(9999, vec![1, 2, 3]), record(REC_RETURN, vec![])]);
        let function = Block {
            id: BLOCK_ID_FUNCTION,
            abbrev_width: 2,
            elements: vec![record(REC_FUNCTION_HEADER, vec![0]), Element::SubBlock(entry)],
        };
        let module = Block {
            id: BLOCK_ID_MODULE,
            abbrev_width: 2,
            elements: vec![Element::SubBlock(function)],
        };
        let stream = Stream { magic: 1, top_level: vec![module] };
        let lifted = lift(&stream).unwrap();
        let f = &lifted.program.functions[0];
        assert!(matches!(f.blocks[0].instructions[0].opcode, Opcode::Unexposed(9999)));
    }
}
