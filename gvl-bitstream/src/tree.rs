use crate::bits::{BitReader, BitWriter};
use crate::error::{BitstreamError, Result};
use std::collections::HashMap;

pub const END_BLOCK: u32 = 0;
pub const ENTER_SUBBLOCK: u32 = 1;
pub const DEFINE_ABBREV: u32 = 2;
pub const UNABBREV_RECORD: u32 = 3;
pub const FIRST_APPLICATION_ABBREV: u32 = 4;

/// Block id reserved for BLOCKINFO: abbreviations defined here apply to a
/// *named target* block id, set by a `SETBID` record, rather than to
/// BLOCKINFO's own element list.
pub const BLOCKINFO_BLOCK_ID: u32 = 0;
pub const BLOCKINFO_CODE_SETBID: u64 = 1;

const TOP_LEVEL_ABBREV_WIDTH: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbbrevOp {
    Literal(u64),
    Fixed(u32),
    Vbr(u32),
    Array,
    Char6,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Abbreviation {
    pub ops: Vec<AbbrevOp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub opcode: u64,
    pub operands: Vec<u64>,
    pub blob: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    SubBlock(Block),
    DefineAbbrev(Abbreviation),
    Record { abbrev_id: u32, record: Record },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: u32,
    pub abbrev_width: u32,
    pub elements: Vec<Element>,
}

/// Abbreviations registered via BLOCKINFO, keyed by the target block id they
/// apply to.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    pub abbrevs_by_block_id: HashMap<u32, Vec<Abbreviation>>,
}

/// The top-level scan result: every top-level block plus the BLOCKINFO table
/// that was threaded through the scan (needed again for re-emission and for
/// the round-trip comparison, since BLOCKINFO abbreviations are not stored
/// inline on the blocks they apply to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub magic: u32,
    pub top_level: Vec<Block>,
}

struct ScanState {
    blockinfo: HashMap<u32, Vec<Abbreviation>>,
}

fn local_abbrev_count(state: &ScanState, block_id: u32) -> usize {
    state
        .blockinfo
        .get(&block_id)
        .map(|v| v.len())
        .unwrap_or(0)
}

fn decode_abbrev_def(reader: &mut BitReader) -> Result<Abbreviation> {
    let num_ops = reader.read_vbr(5)? as usize;
    let mut ops = Vec::with_capacity(num_ops);
    for _ in 0..num_ops {
        let is_literal = reader.read_fixed(1)? != 0;
        if is_literal {
            ops.push(AbbrevOp::Literal(reader.read_vbr(8)?));
            continue;
        }
        let encoding = reader.read_fixed(3)?;
        let op = match encoding {
            1 => AbbrevOp::Fixed(reader.read_vbr(5)? as u32),
            2 => AbbrevOp::Vbr(reader.read_vbr(5)? as u32),
            3 => AbbrevOp::Array,
            4 => AbbrevOp::Char6,
            5 => AbbrevOp::Blob,
            other => {
                return Err(BitstreamError::ImpossibleAbbrevWidth(other as u32));
            }
        };
        ops.push(op);
    }
    Ok(Abbreviation { ops })
}

fn encode_abbrev_def(writer: &mut BitWriter, abbrev: &Abbreviation) -> Result<()> {
    writer.write_vbr(abbrev.ops.len() as u64, 5)?;
    for op in &abbrev.ops {
        match op {
            AbbrevOp::Literal(v) => {
                writer.write_fixed(1, 1)?;
                writer.write_vbr(*v, 8)?;
            }
            AbbrevOp::Fixed(w) => {
                writer.write_fixed(0, 1)?;
                writer.write_fixed(1, 3)?;
                writer.write_vbr(*w as u64, 5)?;
            }
            AbbrevOp::Vbr(w) => {
                writer.write_fixed(0, 1)?;
                writer.write_fixed(2, 3)?;
                writer.write_vbr(*w as u64, 5)?;
            }
            AbbrevOp::Array => {
                writer.write_fixed(0, 1)?;
                writer.write_fixed(3, 3)?;
            }
            AbbrevOp::Char6 => {
                writer.write_fixed(0, 1)?;
                writer.write_fixed(4, 3)?;
            }
            AbbrevOp::Blob => {
                writer.write_fixed(0, 1)?;
                writer.write_fixed(5, 3)?;
            }
        }
    }
    Ok(())
}

fn decode_scalar_op(reader: &mut BitReader, op: &AbbrevOp) -> Result<u64> {
    match op {
        AbbrevOp::Literal(v) => Ok(*v),
        AbbrevOp::Fixed(w) => reader.read_fixed(*w),
        AbbrevOp::Vbr(w) => reader.read_vbr(*w),
        AbbrevOp::Char6 => reader.read_char6().map(|c| c as u64),
        AbbrevOp::Array | AbbrevOp::Blob => Err(BitstreamError::ImpossibleAbbrevWidth(0)),
    }
}

fn encode_scalar_op(writer: &mut BitWriter, op: &AbbrevOp, value: u64) -> Result<()> {
    match op {
        AbbrevOp::Literal(_) => Ok(()),
        AbbrevOp::Fixed(w) => writer.write_fixed(value, *w),
        AbbrevOp::Vbr(w) => writer.write_vbr(value, *w),
        AbbrevOp::Char6 => writer.write_char6(value as u8),
        AbbrevOp::Array | AbbrevOp::Blob => Err(BitstreamError::ImpossibleAbbrevWidth(0)),
    }
}

fn decode_abbreviated_record(reader: &mut BitReader, abbrev: &Abbreviation) -> Result<Record> {
    let mut values = Vec::new();
    let mut blob = None;
    let mut i = 0usize;
    while i < abbrev.ops.len() {
        match &abbrev.ops[i] {
            AbbrevOp::Array => {
                let count = reader.read_vbr(6)?;
                let element_op = abbrev
                    .ops
                    .get(i + 1)
                    .ok_or(BitstreamError::UnknownAbbreviation(0))?;
                for _ in 0..count {
                    values.push(decode_scalar_op(reader, element_op)?);
                }
                i += 2;
                continue;
            }
            AbbrevOp::Blob => {
                blob = Some(reader.read_blob()?);
                i += 1;
                continue;
            }
            other => {
                values.push(decode_scalar_op(reader, other)?);
                i += 1;
            }
        }
    }
    if values.is_empty() {
        return Err(BitstreamError::UnknownAbbreviation(0));
    }
    Ok(Record {
        opcode: values[0],
        operands: values[1..].to_vec(),
        blob,
    })
}

fn encode_abbreviated_record(writer: &mut BitWriter, abbrev: &Abbreviation, record: &Record) -> Result<()> {
    let mut values = Vec::with_capacity(1 + record.operands.len());
    values.push(record.opcode);
    values.extend_from_slice(&record.operands);
    let mut value_idx = 0usize;
    let mut i = 0usize;
    while i < abbrev.ops.len() {
        match &abbrev.ops[i] {
            AbbrevOp::Array => {
                let element_op = abbrev
                    .ops
                    .get(i + 1)
                    .ok_or(BitstreamError::UnknownAbbreviation(0))?;
                let remaining = values.len() - value_idx;
                writer.write_vbr(remaining as u64, 6)?;
                for _ in 0..remaining {
                    encode_scalar_op(writer, element_op, values[value_idx])?;
                    value_idx += 1;
                }
                i += 2;
                continue;
            }
            AbbrevOp::Blob => {
                writer.write_blob(record.blob.as_deref().unwrap_or(&[]))?;
                i += 1;
                continue;
            }
            AbbrevOp::Literal(_) => {
                // literals don't consume a value slot on read, but they do
                // occupy a logical field; keep value_idx aligned with decode.
                value_idx += 1;
                i += 1;
            }
            other => {
                encode_scalar_op(writer, other, values[value_idx])?;
                value_idx += 1;
                i += 1;
            }
        }
    }
    Ok(())
}

fn resolve_abbrev<'a>(
    state: &'a ScanState,
    block_id: u32,
    local_abbrevs: &'a [Abbreviation],
    abbrev_id: u32,
) -> Result<&'a Abbreviation> {
    let index = (abbrev_id - FIRST_APPLICATION_ABBREV) as usize;
    let blockinfo_count = local_abbrev_count(state, block_id);
    if index < blockinfo_count {
        Ok(&state.blockinfo[&block_id][index])
    } else {
        local_abbrevs
            .get(index - blockinfo_count)
            .ok_or(BitstreamError::UnknownAbbreviation(abbrev_id))
    }
}

fn scan_block(reader: &mut BitReader, id: u32, abbrev_width: u32, state: &mut ScanState) -> Result<Block> {
    let mut elements = Vec::new();
    let mut local_abbrevs: Vec<Abbreviation> = Vec::new();
    let mut blockinfo_target: Option<u32> = None;

    loop {
        let abbrev_id = reader.read_fixed(abbrev_width)? as u32;
        match abbrev_id {
            END_BLOCK => {
                reader.align32()?;
                break;
            }
            ENTER_SUBBLOCK => {
                let sub_id = reader.read_vbr(8)? as u32;
                let sub_abbrev_width = reader.read_vbr(4)? as u32;
                reader.align32()?;
                let _len_words = reader.read_fixed(32)?;
                let sub_block = scan_block(reader, sub_id, sub_abbrev_width, state)?;
                elements.push(Element::SubBlock(sub_block));
            }
            DEFINE_ABBREV => {
                let abbrev = decode_abbrev_def(reader)?;
                if id == BLOCKINFO_BLOCK_ID {
                    if let Some(target) = blockinfo_target {
                        state
                            .blockinfo
                            .entry(target)
                            .or_default()
                            .push(abbrev.clone());
                    }
                } else {
                    local_abbrevs.push(abbrev.clone());
                }
                elements.push(Element::DefineAbbrev(abbrev));
            }
            UNABBREV_RECORD => {
                let code = reader.read_vbr(6)?;
                let num_ops = reader.read_vbr(6)? as usize;
                let mut operands = Vec::with_capacity(num_ops);
                for _ in 0..num_ops {
                    operands.push(reader.read_vbr(6)?);
                }
                if id == BLOCKINFO_BLOCK_ID && code == BLOCKINFO_CODE_SETBID {
                    blockinfo_target = operands.first().map(|v| *v as u32);
                }
                elements.push(Element::Record {
                    abbrev_id,
                    record: Record {
                        opcode: code,
                        operands,
                        blob: None,
                    },
                });
            }
            _ => {
                let abbrev = resolve_abbrev(state, id, &local_abbrevs, abbrev_id)?.clone();
                let record = decode_abbreviated_record(reader, &abbrev)?;
                elements.push(Element::Record { abbrev_id, record });
            }
        }
    }

    Ok(Block {
        id,
        abbrev_width,
        elements,
    })
}

/// Parses an entire bitstream: validates the magic, then scans top-level
/// blocks at the fixed top-level abbreviation width. A parse failure aborts
/// instrumentation of the owning shader (§4.1, §7) -- the caller passes the
/// bytecode through untouched.
pub fn scan(data: &[u8], expected_magic: u32) -> Result<Stream> {
    let mut reader = BitReader::new(data);
    let magic = reader.read_fixed(32)? as u32;
    if magic != expected_magic {
        return Err(BitstreamError::BadMagic {
            expected: expected_magic,
            found: magic,
        });
    }

    let mut state = ScanState {
        blockinfo: HashMap::new(),
    };
    let mut top_level = Vec::new();
    while !reader.at_end() {
        // Top-level blocks are entered the same way as nested ones: an
        // ENTER_SUBBLOCK abbreviation id read at the top-level width.
        let remaining_bits = reader.total_bits() - reader.bit_position();
        if remaining_bits < TOP_LEVEL_ABBREV_WIDTH as usize {
            break;
        }
        let abbrev_id = reader.read_fixed(TOP_LEVEL_ABBREV_WIDTH)? as u32;
        if abbrev_id != ENTER_SUBBLOCK {
            break;
        }
        let sub_id = reader.read_vbr(8)? as u32;
        let sub_abbrev_width = reader.read_vbr(4)? as u32;
        reader.align32()?;
        let _len_words = reader.read_fixed(32)?;
        top_level.push(scan_block(&mut reader, sub_id, sub_abbrev_width, &mut state)?);
    }

    Ok(Stream { magic, top_level })
}

fn emit_block(writer: &mut BitWriter, block: &Block, state: &mut ScanState) -> Result<()> {
    let mut local_abbrevs: Vec<Abbreviation> = Vec::new();
    let mut blockinfo_target: Option<u32> = None;

    for element in &block.elements {
        match element {
            Element::SubBlock(sub) => {
                writer.write_fixed(ENTER_SUBBLOCK as u64, block.abbrev_width)?;
                writer.write_vbr(sub.id as u64, 8)?;
                writer.write_vbr(sub.abbrev_width as u64, 4)?;
                writer.align32();
                // Reserve the length word; patched in after the sub-block is
                // fully emitted.
                let len_word_bit = writer.bit_position();
                writer.write_fixed(0, 32)?;
                let body_start_bit = writer.bit_position();
                emit_block(writer, sub, state)?;
                let body_end_bit = writer.bit_position();
                let len_words = ((body_end_bit - body_start_bit) / 32) as u32;
                writer.patch_fixed32(len_word_bit, len_words);
            }
            Element::DefineAbbrev(abbrev) => {
                writer.write_fixed(DEFINE_ABBREV as u64, block.abbrev_width)?;
                encode_abbrev_def(writer, abbrev)?;
                if block.id == BLOCKINFO_BLOCK_ID {
                    if let Some(target) = blockinfo_target {
                        state.blockinfo.entry(target).or_default().push(abbrev.clone());
                    }
                } else {
                    local_abbrevs.push(abbrev.clone());
                }
            }
            Element::Record { abbrev_id, record } if *abbrev_id == UNABBREV_RECORD => {
                writer.write_fixed(UNABBREV_RECORD as u64, block.abbrev_width)?;
                writer.write_vbr(record.opcode, 6)?;
                writer.write_vbr(record.operands.len() as u64, 6)?;
                for &operand in &record.operands {
                    writer.write_vbr(operand, 6)?;
                }
                if block.id == BLOCKINFO_BLOCK_ID && record.opcode == BLOCKINFO_CODE_SETBID {
                    blockinfo_target = record.operands.first().map(|v| *v as u32);
                }
            }
            Element::Record { abbrev_id, record } => {
                let abbrev = resolve_abbrev(state, block.id, &local_abbrevs, *abbrev_id)?.clone();
                writer.write_fixed(*abbrev_id as u64, block.abbrev_width)?;
                encode_abbreviated_record(writer, &abbrev, record)?;
            }
        }
    }

    writer.write_fixed(END_BLOCK as u64, block.abbrev_width)?;
    writer.align32();
    Ok(())
}

/// Re-emits a [`Stream`] byte-exactly with respect to its own parse: blocks
/// are written in recorded element order, never re-sorted, and reserved
/// abbreviation ids are preserved even where they duplicate a later
/// application abbreviation's numeric id space.
pub fn emit(stream: &Stream) -> Result<Vec<u8>> {
    let mut writer = BitWriter::new();
    writer.write_fixed(stream.magic as u64, 32)?;
    let mut state = ScanState {
        blockinfo: HashMap::new(),
    };
    for block in &stream.top_level {
        writer.write_fixed(ENTER_SUBBLOCK as u64, TOP_LEVEL_ABBREV_WIDTH)?;
        writer.write_vbr(block.id as u64, 8)?;
        writer.write_vbr(block.abbrev_width as u64, 4)?;
        writer.align32();
        let len_word_bit = writer.bit_position();
        writer.write_fixed(0, 32)?;
        let body_start_bit = writer.bit_position();
        emit_block(&mut writer, block, &mut state)?;
        let body_end_bit = writer.bit_position();
        let len_words = ((body_end_bit - body_start_bit) / 32) as u32;
        writer.patch_fixed32(len_word_bit, len_words);
    }
    Ok(writer.into_bytes())
}

/// The round-trip contract from §4.1/§4.6: re-scan freshly emitted bytes and
/// assert structural equality with the tree that produced them.
pub fn verify_round_trip(stream: &Stream, emitted: &[u8]) -> Result<()> {
    let rescanned = scan(emitted, stream.magic)?;
    if &rescanned == stream {
        Ok(())
    } else {
        Err(BitstreamError::RoundTripMismatch)
    }
}
