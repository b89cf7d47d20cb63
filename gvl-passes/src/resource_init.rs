use std::collections::HashMap;
use std::collections::HashSet;

use gvl_core::{ErrorRecord, MessageKind, ObjectInfo, PayloadKey, ResourceResolver, SourceExtract, ValidationMessage};
use gvl_il::{Instruction, Opcode, Program, SourceSpan, Type, ValueId};

use crate::error::Result;
use crate::location::LocationRegistry;
use crate::pass::{Pass, StorageDecl};
use crate::registry::PassUids;
use crate::rewrite::{find_site, guard_instruction, GuardIds, GuardSpec};

/// Record-decode feature-id for "accessed an uninitialized texel" (§1, §4.5).
pub const FEATURE_ID: u16 = 2;

fn is_load(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::LoadBuffer | Opcode::LoadTexture)
}

fn is_store(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::StoreBuffer | Opcode::StoreTexture)
}

/// Tracks, per resource element, whether it has been written before a read
/// observes it. Every store this pass sees gets a side-effect appended that
/// marks its element initialized in this pass's diagnostic storage slot
/// (§3 "Descriptor Storage Slot"); every load is guarded by reading that
/// slot back and comparing against zero -- the same guard shape §4.5
/// describes for resource-bounds, just with a different predicate source.
pub struct ResourceInitializationPass {
    uids: PassUids,
}

impl ResourceInitializationPass {
    pub fn new() -> Self {
        ResourceInitializationPass { uids: PassUids::default() }
    }

    /// Appends `storage[index] = 1` right after a store, marking the
    /// element initialized. No guard branch: a store always succeeds at
    /// marking its own element, there is nothing to report here.
    fn instrument_store(&self, program: &mut Program, function_index: usize, block_index: usize, inst_index: usize) {
        let u32_ty = program.types.intern(Type::Int { width: 32, signed: false });
        let buffer_ty = program.types.intern(Type::Buffer { element: u32_ty, texel_format: 0 });
        let handle_id = program.allocate_value();
        let one_id = program.allocate_value();

        let block = &mut program.functions[function_index].blocks[block_index];
        let index = block.instructions[inst_index].operands[1];
        let insert_at = inst_index + 1;

        block.instructions.insert(
            insert_at,
            Instruction::new(Opcode::Undef)
                .with_result(handle_id, buffer_ty)
                .with_immediates([self.uids.storage_uid as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            insert_at + 1,
            Instruction::new(Opcode::Literal).with_result(one_id, u32_ty).with_immediates([1]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            insert_at + 2,
            Instruction::new(Opcode::StoreBuffer).with_operands([handle_id, index, one_id]).with_span(SourceSpan::UNKNOWN),
        );
    }

    fn instrument_load(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
        block_index: usize,
        inst_index: usize,
    ) {
        let u32_ty = program.types.intern(Type::Int { width: 32, signed: false });
        let bool_ty = program.types.intern(Type::Bool);
        let buffer_ty = program.types.intern(Type::Buffer { element: u32_ty, texel_format: 0 });

        let handle_id = program.allocate_value();
        let zero_id = program.allocate_value();
        let flag_id = program.allocate_value();
        let pred_id = program.allocate_value();
        let payload_id = program.allocate_value();
        let post_id = program.allocate_value();
        let error_id = program.allocate_value();
        let default_value = program.allocate_value();
        let phi_result = program.allocate_value();

        let function = &mut program.functions[function_index];
        let block = &mut function.blocks[block_index];
        let access = block.instructions[inst_index].clone();
        let index = access.operands[1];
        let span = access.span;
        let has_result = access.opcode.has_result();

        block.instructions.insert(
            inst_index,
            Instruction::new(Opcode::Undef)
                .with_result(handle_id, buffer_ty)
                .with_immediates([self.uids.storage_uid as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 1,
            Instruction::new(Opcode::Literal).with_result(zero_id, u32_ty).with_immediates([0]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 2,
            Instruction::new(Opcode::LoadBuffer)
                .with_result(flag_id, u32_ty)
                .with_operands([handle_id, index])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 3,
            Instruction::new(Opcode::NotEqual)
                .with_result(pred_id, bool_ty)
                .with_operands([flag_id, zero_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 4,
            Instruction::new(Opcode::Literal).with_result(payload_id, u32_ty).with_immediates([0]).with_span(SourceSpan::UNKNOWN),
        );

        let extract = SourceExtract {
            file_id: 0,
            line: span.start_bit as u32,
            column: 0,
            length: span.bit_len() as u32,
            snippet: None,
        };
        let span_guid = locations.register(extract);

        let spec = GuardSpec {
            predicate: pred_id,
            payload: payload_id,
            feature_id: FEATURE_ID,
            span_guid,
            result: if has_result { Some((access.result, access.result_type)) } else { None },
        };
        let ids = GuardIds { post: post_id, error: error_id, default_value, phi_result };
        // The access instruction itself (now at `inst_index + 5` after the
        // five lead-in instructions) is the one that gets split.
        guard_instruction(function, block_index, inst_index + 5, spec, ids);
    }
}

impl Default for ResourceInitializationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for ResourceInitializationPass {
    fn feature_id(&self) -> u16 {
        FEATURE_ID
    }

    fn bind_uids(&mut self, uids: PassUids) {
        self.uids = uids;
    }

    fn uids(&self) -> PassUids {
        self.uids
    }

    fn enumerate_storage(&self) -> &[StorageDecl] {
        &[StorageDecl { dwords_per_binding: 1 }]
    }

    fn rewrite_function(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
    ) -> Result<()> {
        // Stores have no result id to key a `HashSet<ValueId>` on, so the
        // store and load sweeps are kept as two separate loops with their
        // own termination test instead of sharing `find_site`'s signature.
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site_by_position(function, |inst| is_store(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            self.instrument_store(program, function_index, block_index, inst_index);
        }

        let mut instrumented: HashSet<ValueId> = HashSet::new();
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site(function, &instrumented, |inst| is_load(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            let result = program.functions[function_index].blocks[block_index].instructions[inst_index].result;
            self.instrument_load(program, function_index, locations, block_index, inst_index);
            instrumented.insert(result);
        }
        Ok(())
    }

    fn handle(&self, _command_version: u64, records: &[ErrorRecord], _resolver: &dyn ResourceResolver) -> Vec<ValidationMessage> {
        let mut merged: HashMap<PayloadKey, u32> = HashMap::new();
        for record in records.iter().filter(|r| r.feature_id as u16 == FEATURE_ID) {
            let key = PayloadKey { feature_id: record.feature_id, span_guid: record.span_guid, resource_key: record.payload };
            *merged.entry(key).or_insert(0) += 1;
        }
        merged
            .into_iter()
            .map(|(_, count)| ValidationMessage {
                kind: MessageKind::ValidationError,
                merged_count: count,
                feature_id: FEATURE_ID,
                error_subtype: 0,
                text: "read of an uninitialized resource element".to_string(),
                object: Some(ObjectInfo { puid: gvl_core::NULL_TEXTURE_PUID, debug_name: None }),
                source: None,
                marker_stack: Vec::new(),
            })
            .collect()
    }
}

/// Like [`find_site`] but for instructions with no result id to dedup by --
/// used for the store sweep, which is driven purely by "does a matching,
/// not-yet-instrumented store still exist" and relies on each call site
/// having mutated the block before asking again. A store is "unmarked"
/// until this pass's own `Undef` (the storage handle lead-in of
/// [`ResourceInitializationPass::instrument_store`]) has been spliced in
/// directly after it -- nothing else in this pass's rewrite ever inserts an
/// `Undef` right after a store, so that's a sufficient marker.
fn find_site_by_position(
    function: &gvl_il::Function,
    matches: impl Fn(&gvl_il::Instruction) -> bool,
) -> Option<(usize, usize)> {
    for (block_index, block) in function.blocks.iter().enumerate() {
        for (inst_index, inst) in block.instructions.iter().enumerate() {
            if !matches(inst) {
                continue;
            }
            let already_marked = matches!(
                block.instructions.get(inst_index + 1).map(|i| i.opcode),
                Some(Opcode::Undef)
            );
            if !already_marked {
                return Some((block_index, inst_index));
            }
        }
    }
    None
}
