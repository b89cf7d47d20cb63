use std::collections::HashMap;
use std::collections::HashSet;

use gvl_core::{ErrorRecord, MessageKind, ObjectInfo, PayloadKey, ResourceResolver, SourceExtract, ValidationMessage};
use gvl_il::{Instruction, Opcode, Program, SourceSpan, Type, ValueId};

use crate::error::Result;
use crate::location::LocationRegistry;
use crate::pass::{Pass, StorageDecl, UpdateDescriptorsCtx};
use crate::registry::PassUids;
use crate::rewrite::{find_site, guard_instruction, GuardIds, GuardSpec};

/// Record-decode feature-id for "accessed a descriptor that has never been
/// written" (§4.7's "validity flag, true once any update has been applied").
pub const FEATURE_ID: u16 = 4;

fn is_load(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::LoadBuffer | Opcode::LoadTexture)
}

fn is_store(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::StoreBuffer | Opcode::StoreTexture)
}

/// Guards every resource access against the wrapped descriptor-set's
/// validity flag rather than anything computed in the shader itself: the
/// flag is a single host-maintained dword per binding, flipped from 0 to 1
/// the first time `UpdateDescriptorSets` (or a template/push-descriptor
/// variant) writes that binding, never by GPU code. The IL rewrite only
/// reads it back -- the write side lives entirely in
/// [`Pass::update_descriptors`], which runs host-side whenever the
/// application updates the descriptor set (§4.7).
///
/// Unlike [`crate::resource_init`], which marks initialization per *element*
/// from GPU-side stores, this pass's storage slot is written once per
/// binding from the host, so there is no in-shader store sweep: a shader
/// never makes a descriptor valid, only the application does.
pub struct DescriptorValidityPass {
    uids: PassUids,
    storage: [StorageDecl; 1],
}

impl DescriptorValidityPass {
    pub fn new() -> Self {
        DescriptorValidityPass { uids: PassUids::default(), storage: [StorageDecl { dwords_per_binding: 1 }] }
    }

    fn instrument_access(
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

        let extract = SourceExtract { file_id: 0, line: span.start_bit as u32, column: 0, length: span.bit_len() as u32, snippet: None };
        let span_guid = locations.register(extract);

        let spec = GuardSpec {
            predicate: pred_id,
            payload: payload_id,
            feature_id: FEATURE_ID,
            span_guid,
            result: if has_result { Some((access.result, access.result_type)) } else { None },
        };
        let ids = GuardIds { post: post_id, error: error_id, default_value, phi_result };
        guard_instruction(function, block_index, inst_index + 5, spec, ids);
    }
}

impl Default for DescriptorValidityPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for DescriptorValidityPass {
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
        &self.storage
    }

    /// Marks every binding this write touches as valid. Mixed push/update
    /// writes never reach here together -- the descriptor model (C7)
    /// already rejects mixed-set updates before a pass ever sees them -- so
    /// this only needs to handle "some write happened", not distinguish how.
    fn update_descriptors(&self, ctx: &mut UpdateDescriptorsCtx) {
        for _ in ctx.top_descriptors {
            ctx.diag_descriptors.push(1u8);
        }
    }

    fn rewrite_function(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
    ) -> Result<()> {
        // Stores: no result id to dedup on, so key on the operand identity
        // of the access being guarded, same as the data-race write sweep.
        let mut instrumented: HashSet<ValueId> = HashSet::new();
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site(function, &instrumented, |inst| is_store(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            let key = {
                let inst = &program.functions[function_index].blocks[block_index].instructions[inst_index];
                ValueId(inst.operands[0].0 ^ inst.operands[1].0.rotate_left(16))
            };
            self.instrument_access(program, function_index, locations, block_index, inst_index);
            instrumented.insert(key);
        }

        let mut instrumented: HashSet<ValueId> = HashSet::new();
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site(function, &instrumented, |inst| is_load(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            let result = program.functions[function_index].blocks[block_index].instructions[inst_index].result;
            self.instrument_access(program, function_index, locations, block_index, inst_index);
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
                text: "access through a descriptor that was never written".to_string(),
                object: Some(ObjectInfo { puid: gvl_core::NULL_BUFFER_PUID, debug_name: None }),
                source: None,
                marker_stack: Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvl_il::{BasicBlock, BlockId, Function, TypeId};

    fn module_with_one_load() -> (Program, usize) {
        let mut program = Program::new();
        let u32_ty = program.types.intern(Type::Int { width: 32, signed: false });
        let mut f = Function::new("main", TypeId::INVALID);

        let resource = program.allocate_value();
        let index = program.allocate_value();
        let loaded = program.allocate_value();

        let mut block = BasicBlock::new(BlockId(0));
        block.instructions.push(
            Instruction::new(Opcode::LoadBuffer)
                .with_result(loaded, u32_ty)
                .with_operands([resource, index])
                .with_span(SourceSpan::new(0, 32)),
        );
        block.instructions.push(Instruction::new(Opcode::Return).with_operands([loaded]).with_span(SourceSpan::new(32, 40)));
        f.blocks.push(block);
        f.entry = BlockId(0);
        program.functions.push(f);
        (program, 0)
    }

    #[test]
    fn load_through_an_unwritten_descriptor_gets_guarded() {
        let (mut program, function_index) = module_with_one_load();
        let pass = DescriptorValidityPass::new();
        let mut locations = LocationRegistry::new();
        pass.rewrite_function(&mut program, function_index, &mut locations).unwrap();

        let function = &program.functions[function_index];
        assert_eq!(function.blocks.len(), 3);
        assert_eq!(locations.len(), 1);
    }

    #[test]
    fn update_descriptors_marks_every_touched_binding_valid() {
        let pass = DescriptorValidityPass::new();
        let writes = vec![crate::pass::TrackedWrite { binding: 0, array_element: 0, payload: vec![] }];
        let mut diag = Vec::new();
        let mut ctx = UpdateDescriptorsCtx {
            set_uid: 0,
            is_update: true,
            is_push: false,
            top_descriptors: &writes,
            diag_descriptors: &mut diag,
        };
        pass.update_descriptors(&mut ctx);
        assert_eq!(diag, vec![1u8]);
    }

    #[test]
    fn handle_merges_records_sharing_a_payload_key() {
        let pass = DescriptorValidityPass::new();
        let records = [
            ErrorRecord::new(FEATURE_ID as u8, 3, 0),
            ErrorRecord::new(FEATURE_ID as u8, 3, 0),
        ];
        let messages = pass.handle(0, &records, &gvl_core::NullResolver);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].merged_count, 2);
    }
}
