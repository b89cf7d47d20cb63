pub mod bits;
pub mod error;
pub mod tree;

pub use bits::{decode_char6, encode_char6, BitReader, BitWriter};
pub use error::{BitstreamError, Result};
pub use tree::{
    emit, scan, verify_round_trip, AbbrevOp, Abbreviation, Block, BlockInfo, Element, Record,
    Stream, BLOCKINFO_BLOCK_ID, BLOCKINFO_CODE_SETBID, DEFINE_ABBREV, END_BLOCK,
    ENTER_SUBBLOCK, FIRST_APPLICATION_ABBREV, UNABBREV_RECORD,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> Stream {
        // One top-level block (id 8) at abbrev width 3, containing:
        // a DEFINE_ABBREV for a simple (literal-code, fixed-8) record, one
        // record using it, and one unabbreviated record.
        let abbrev = Abbreviation {
            ops: vec![AbbrevOp::Literal(42), AbbrevOp::Fixed(8)],
        };
        Stream {
            magic: 0x4D4F4458, // "XDOM" as a stand-in container magic
            top_level: vec![Block {
                id: 8,
                abbrev_width: 3,
                elements: vec![
                    Element::DefineAbbrev(abbrev.clone()),
                    Element::Record {
                        abbrev_id: FIRST_APPLICATION_ABBREV,
                        record: Record {
                            opcode: 42,
                            operands: vec![200],
                            blob: None,
                        },
                    },
                    Element::Record {
                        abbrev_id: UNABBREV_RECORD,
                        record: Record {
                            opcode: 7,
                            operands: vec![1, 2, 3],
                            blob: None,
                        },
                    },
                ],
            }],
        }
    }

    #[test]
    fn emit_then_scan_round_trips_structurally() {
        let stream = sample_stream();
        let bytes = emit(&stream).unwrap();
        let rescanned = scan(&bytes, stream.magic).unwrap();
        assert_eq!(rescanned, stream);
        verify_round_trip(&stream, &bytes).unwrap();
    }

    #[test]
    fn bad_magic_is_rejected() {
        let stream = sample_stream();
        let bytes = emit(&stream).unwrap();
        let err = scan(&bytes, 0xDEADBEEF).unwrap_err();
        assert!(matches!(err, BitstreamError::BadMagic { .. }));
    }

    #[test]
    fn blockinfo_abbrevs_apply_to_their_target_block_only() {
        let shared_abbrev = Abbreviation {
            ops: vec![AbbrevOp::Literal(5), AbbrevOp::Vbr(6)],
        };
        let stream = Stream {
            magic: 0x1,
            top_level: vec![
                Block {
                    id: BLOCKINFO_BLOCK_ID,
                    abbrev_width: 2,
                    elements: vec![
                        Element::Record {
                            abbrev_id: UNABBREV_RECORD,
                            record: Record {
                                opcode: BLOCKINFO_CODE_SETBID,
                                operands: vec![9],
                                blob: None,
                            },
                        },
                        Element::DefineAbbrev(shared_abbrev.clone()),
                    ],
                },
                Block {
                    id: 9,
                    abbrev_width: 2,
                    elements: vec![Element::Record {
                        abbrev_id: FIRST_APPLICATION_ABBREV,
                        record: Record {
                            opcode: 5,
                            operands: vec![123],
                            blob: None,
                        },
                    }],
                },
            ],
        };
        let bytes = emit(&stream).unwrap();
        let rescanned = scan(&bytes, stream.magic).unwrap();
        assert_eq!(rescanned, stream);
    }
}
