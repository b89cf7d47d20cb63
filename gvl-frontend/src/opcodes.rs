//! Record-code table for the module dialect lifted from a bitstream
//! `FUNCTION` block. Unlike LLVM IR's reuse of one numeric opcode space
//! across encodings, every record here is emitted unabbreviated-or-not with
//! the same leading `opcode` field, so the lifter only has to look at
//! [`gvl_bitstream::Record::opcode`] to dispatch.

pub const REC_LITERAL: u64 = 1;
pub const REC_ADD: u64 = 2;
pub const REC_SUB: u64 = 3;
pub const REC_MUL: u64 = 4;
pub const REC_DIV: u64 = 5;
pub const REC_BIT_OR: u64 = 6;
pub const REC_BIT_AND: u64 = 7;
pub const REC_SHL: u64 = 8;
pub const REC_SHR: u64 = 9;
pub const REC_AND: u64 = 10;
pub const REC_OR: u64 = 11;
pub const REC_ANY: u64 = 12;
pub const REC_ALL: u64 = 13;
pub const REC_EQ: u64 = 14;
pub const REC_NE: u64 = 15;
pub const REC_LT: u64 = 16;
pub const REC_LE: u64 = 17;
pub const REC_GT: u64 = 18;
pub const REC_GE: u64 = 19;
pub const REC_ALLOCA: u64 = 20;
pub const REC_LOAD: u64 = 21;
pub const REC_STORE: u64 = 22;
pub const REC_ADDRESS_CHAIN: u64 = 23;
pub const REC_LOAD_BUFFER: u64 = 24;
pub const REC_STORE_BUFFER: u64 = 25;
pub const REC_LOAD_TEXTURE: u64 = 26;
pub const REC_STORE_TEXTURE: u64 = 27;
pub const REC_RESOURCE_SIZE: u64 = 28;
pub const REC_BRANCH: u64 = 29;
pub const REC_BRANCH_COND: u64 = 30;
pub const REC_SWITCH: u64 = 31;
pub const REC_PHI: u64 = 32;
pub const REC_RETURN: u64 = 33;
/// Samples through a combined image+sampler operand -- the one record shape
/// that lifts to two IL values instead of one (see
/// [`crate::module_front::lift_function`]'s combined-sampler handling).
pub const REC_SAMPLE_COMBINED: u64 = 34;
/// Structured-control markers, placed immediately before the terminator
/// record of the block they annotate (mirroring `OpSelectionMerge` /
/// `OpLoopMerge` preceding their branch in the SPIR-V dialect these lift
/// from). Carries no result -- `lift_basic_block` folds it into the
/// block's [`gvl_il::StructuredAnnotation`] instead of an instruction.
pub const REC_SELECTION_MERGE: u64 = 35;
/// Like [`REC_SELECTION_MERGE`] but for a loop header: operand 0 is the
/// merge block, operand 1 is the continue block.
pub const REC_LOOP_MERGE: u64 = 36;

pub const BLOCK_ID_MODULE: u32 = 1;
pub const BLOCK_ID_FUNCTION: u32 = 2;
pub const BLOCK_ID_BASIC_BLOCK: u32 = 3;

/// First record of a MODULE block: declares the function count so the
/// lifter can preallocate.
pub const REC_MODULE_HEADER: u64 = 100;
/// First record of a FUNCTION block: name (as char6-encoded array) and
/// return type id.
pub const REC_FUNCTION_HEADER: u64 = 101;
