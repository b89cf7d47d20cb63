use gvl_container::{tag, Container};
use gvl_il::Program;
use gvl_passes::Pass;

use crate::error::{BackendError, Result};
use crate::lower::lower;
use crate::pipeline::{PassPipeline, PipelineReport};

/// Everything one call to [`instrument_container`] produces, beyond the new
/// bytes themselves -- the caller (the shader cache, `gvl-layer`) needs the
/// location registry to decode span-GUIDs later and the touched-block
/// count to satisfy the "zero instrumentable sites -> zero injected
/// instructions" boundary check (§8).
pub struct InstrumentResult {
    pub bytes: Vec<u8>,
    pub report: PipelineReport,
}

fn read_magic(module_bytes: &[u8]) -> Result<u32> {
    module_bytes
        .get(0..4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        .ok_or(BackendError::MissingModuleChunk)
}

/// Lifts `program`'s bitstream-module chunk back to IL -- only used by the
/// back-end's own validation mirror, not by the front-end proper.
fn relift(module_bytes: &[u8], magic: u32) -> Result<Program> {
    let stream = gvl_bitstream::scan(module_bytes, magic)?;
    Ok(gvl_frontend::lift(&stream)?.program)
}

/// One structural comparison of two programs, deep enough to catch a
/// back-end bug that silently drops or duplicates an instruction while
/// still passing bitstream-level round-trip (§4.6 "the back-end MUST
/// re-scan the emitted bytecode and structurally compare the result to the
/// IL it just emitted"). Doesn't compare the type/constant pools by id
/// (those are intern tables, not content a caller round-trips against) --
/// only function/block/instruction shape and operand identity.
fn programs_structurally_equal(a: &Program, b: &Program) -> bool {
    if a.functions.len() != b.functions.len() {
        return false;
    }
    a.functions.iter().zip(b.functions.iter()).all(|(fa, fb)| {
        fa.blocks.len() == fb.blocks.len()
            && fa.blocks.iter().zip(fb.blocks.iter()).all(|(ba, bb)| {
                ba.instructions.len() == bb.instructions.len()
                    && ba.instructions.iter().zip(bb.instructions.iter()).all(|(ia, ib)| {
                        ia.opcode == ib.opcode
                            && ia.operands.as_slice() == ib.operands.as_slice()
                            && ia.immediates.as_slice() == ib.immediates.as_slice()
                    })
            })
    })
}

/// Runs the full C4->C5->C6 chain (§2 command path) over one shader's
/// container bytes: parse, lift the bitstream module, run the pass
/// pipeline, lower and re-emit, splice the new module chunk back into the
/// container, and verify the result re-parses to the same IL before
/// returning it.
///
/// On any codec/round-trip failure this returns `Err` rather than falling
/// back itself -- the caller (the shader cache) is the one with the
/// context (and the warning-log call site) to decide "fall back to
/// passthrough" per §7; this function's job is only to say whether the
/// instrumented bytes are trustworthy.
pub fn instrument_container(original: &[u8], passes: &[Box<dyn Pass>]) -> Result<InstrumentResult> {
    let mut container = gvl_container::parse(original)?;
    let module_bytes = container
        .known
        .get(&tag::BITSTREAM_MODULE)
        .ok_or(BackendError::MissingModuleChunk)?
        .clone();
    let magic = read_magic(&module_bytes)?;
    let stream = gvl_bitstream::scan(&module_bytes, magic)?;
    let lifted = gvl_frontend::lift(&stream)?;

    let mut program = lifted.program;
    let pipeline = PassPipeline::new(passes);
    let report = pipeline.run(&mut program);

    let lowered_stream = lower(&program, &lifted.combined_splits, magic);
    let new_module_bytes = gvl_bitstream::emit(&lowered_stream)?;
    gvl_bitstream::verify_round_trip(&lowered_stream, &new_module_bytes)
        .map_err(|_| BackendError::RoundTripValidation)?;

    let relifted = relift(&new_module_bytes, magic)?;
    if !programs_structurally_equal(&program, &relifted) {
        return Err(BackendError::RoundTripValidation);
    }

    container.known.insert(tag::BITSTREAM_MODULE, new_module_bytes);
    let bytes = gvl_container::compile(&container);

    Ok(InstrumentResult { bytes, report })
}

/// Passthrough contract for §8's round-trip property 1: instrumenting with
/// the empty pass set must reproduce `original` bit-exactly. Exposed
/// separately from [`instrument_container`] so callers (and tests) don't
/// have to construct an empty `Vec<Box<dyn Pass>>` themselves.
pub fn passthrough(original: &[u8]) -> Result<Vec<u8>> {
    let container: Container = gvl_container::parse(original)?;
    Ok(gvl_container::compile(&container))
}
