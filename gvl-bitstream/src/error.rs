use thiserror::Error;

pub type Result<T> = std::result::Result<T, BitstreamError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("unexpected end of bitstream at bit {0}")]
    Eof(usize),
    #[error("header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("abbreviation width {0} is not representable (must be 1..=32)")]
    ImpossibleAbbrevWidth(u32),
    #[error("abbreviation id {0} has no definition in scope")]
    UnknownAbbreviation(u32),
    #[error("re-emitted bitstream does not match the parsed tree structurally")]
    RoundTripMismatch,
}
