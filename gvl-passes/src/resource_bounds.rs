use std::collections::HashMap;
use std::collections::HashSet;

use gvl_core::{ErrorRecord, MessageKind, ObjectInfo, PayloadKey, ResourceResolver, SourceExtract, ValidationMessage};
use gvl_il::{Instruction, Opcode, Program, SourceSpan, Type, ValueId};

use crate::error::Result;
use crate::location::LocationRegistry;
use crate::pass::Pass;
use crate::registry::PassUids;
use crate::rewrite::{find_site, guard_instruction, GuardIds, GuardSpec};

/// Record-decode feature-id for out-of-bounds resource access (§4.5's first
/// listed instrumentation feature). Distinct from the [`gvl_core::FeatureFlags`]
/// enable bit -- this is the narrower id the error record's packed word
/// actually carries.
pub const FEATURE_ID: u16 = 1;

fn is_resource_access(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::LoadBuffer | Opcode::StoreBuffer | Opcode::LoadTexture | Opcode::StoreTexture
    )
}

/// Rewrites every buffer/texture load and store to guard its index against
/// the resource's actual extent, reporting an out-of-bounds access and
/// substituting a safe zero default for the loaded value (§1, §4.5, §8 S1).
///
/// The predicate for access `LoadBuffer %idx, %resource` becomes
/// `%idx < ResourceSize(%resource)`; `ResourceSize` is a front-end-opaque
/// opcode a back-end lowers to whatever the target format's bound-query
/// instruction is (descriptor range, buffer device size, texture extent).
pub struct ResourceBoundsPass {
    uids: PassUids,
}

impl ResourceBoundsPass {
    pub fn new() -> Self {
        ResourceBoundsPass { uids: PassUids::default() }
    }

    fn rewrite_one_site(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
        block_index: usize,
        inst_index: usize,
    ) {
        let bool_ty = program.types.intern(Type::Bool);
        let size_ty = program.types.intern(Type::Int { width: 32, signed: false });

        let size_result = program.allocate_value();
        let pred_result = program.allocate_value();
        let post_id = program.allocate_value();
        let error_id = program.allocate_value();
        let default_value = program.allocate_value();
        let phi_result = program.allocate_value();

        let function = &mut program.functions[function_index];
        let block = &mut function.blocks[block_index];
        let access = block.instructions[inst_index].clone();
        let resource = access.operands[0];
        let index = access.operands[1];
        let span = access.span;
        let has_result = access.opcode.has_result();

        block.instructions.insert(
            inst_index,
            Instruction::new(Opcode::ResourceSize)
                .with_result(size_result, size_ty)
                .with_operands([resource])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 1,
            Instruction::new(Opcode::LessThan)
                .with_result(pred_result, bool_ty)
                .with_operands([index, size_result])
                .with_span(SourceSpan::UNKNOWN),
        );

        let extract = SourceExtract {
            file_id: 0,
            line: span.start_bit as u32,
            column: 0,
            length: span.bit_len() as u32,
            snippet: None,
        };
        let span_guid = locations.register(extract);

        // The guard's payload is the resource's own PRMT token (its `resource`
        // operand) rather than a synthesized constant, so `handle` can
        // resolve the accessed object's real PUID through the descriptor
        // table instead of reporting the reserved null id unconditionally.
        let spec = GuardSpec {
            predicate: pred_result,
            payload: resource,
            feature_id: FEATURE_ID,
            span_guid,
            result: if has_result { Some((access.result, access.result_type)) } else { None },
        };
        let ids = GuardIds { post: post_id, error: error_id, default_value, phi_result };
        guard_instruction(function, block_index, inst_index + 2, spec, ids);
    }
}

impl Default for ResourceBoundsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for ResourceBoundsPass {
    fn feature_id(&self) -> u16 {
        FEATURE_ID
    }

    fn bind_uids(&mut self, uids: PassUids) {
        self.uids = uids;
    }

    fn uids(&self) -> PassUids {
        self.uids
    }

    fn rewrite_function(
        &self,
        program: &mut Program,
        function_index: usize,
        locations: &mut LocationRegistry,
    ) -> Result<()> {
        let mut instrumented: HashSet<ValueId> = HashSet::new();
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site(function, &instrumented, |inst| is_resource_access(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            let result = program.functions[function_index].blocks[block_index].instructions[inst_index].result;
            self.rewrite_one_site(program, function_index, locations, block_index, inst_index);
            instrumented.insert(result);
        }
        Ok(())
    }

    fn handle(&self, _command_version: u64, records: &[ErrorRecord], resolver: &dyn ResourceResolver) -> Vec<ValidationMessage> {
        let mut merged: HashMap<PayloadKey, u32> = HashMap::new();
        for record in records.iter().filter(|r| r.feature_id as u16 == FEATURE_ID) {
            let key = PayloadKey { feature_id: record.feature_id, span_guid: record.span_guid, resource_key: record.payload };
            *merged.entry(key).or_insert(0) += 1;
        }
        merged
            .into_iter()
            .map(|(key, count)| {
                let puid = resolver.resolve(key.resource_key).unwrap_or(gvl_core::NULL_BUFFER_PUID);
                ValidationMessage {
                    kind: MessageKind::ValidationError,
                    merged_count: count,
                    feature_id: FEATURE_ID,
                    error_subtype: 0,
                    text: "resource access index out of bounds".to_string(),
                    object: Some(ObjectInfo { puid, debug_name: None }),
                    source: None,
                    marker_stack: Vec::new(),
                }
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
    fn rewrite_splits_the_single_access_into_three_blocks() {
        let (mut program, function_index) = module_with_one_load();
        let pass = ResourceBoundsPass::new();
        let mut locations = LocationRegistry::new();
        pass.rewrite_function(&mut program, function_index, &mut locations).unwrap();

        let function = &program.functions[function_index];
        assert_eq!(function.blocks.len(), 3);
        assert_eq!(locations.len(), 1);
    }

    #[test]
    fn handle_merges_records_sharing_a_payload_key() {
        let pass = ResourceBoundsPass::new();
        let records = [
            ErrorRecord::new(FEATURE_ID as u8, 4, 9),
            ErrorRecord::new(FEATURE_ID as u8, 4, 9),
            ErrorRecord::new(FEATURE_ID as u8, 5, 9),
        ];
        let messages = pass.handle(0, &records, &gvl_core::NullResolver);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.iter().map(|m| m.merged_count).sum::<u32>(), 3);
    }

    struct StubResolver;
    impl gvl_core::ResourceResolver for StubResolver {
        fn resolve(&self, resource_key: u32) -> Option<gvl_core::Puid> {
            (resource_key == 9).then_some(77)
        }
    }

    #[test]
    fn handle_resolves_the_resource_key_to_a_live_puid() {
        let pass = ResourceBoundsPass::new();
        let records = [ErrorRecord::new(FEATURE_ID as u8, 4, 9)];
        let messages = pass.handle(0, &records, &StubResolver);
        assert_eq!(messages[0].object.as_ref().unwrap().puid, 77);
    }

    #[test]
    fn handle_falls_back_to_the_null_puid_when_unresolved() {
        let pass = ResourceBoundsPass::new();
        let records = [ErrorRecord::new(FEATURE_ID as u8, 4, 1234)];
        let messages = pass.handle(0, &records, &StubResolver);
        assert_eq!(messages[0].object.as_ref().unwrap().puid, gvl_core::NULL_BUFFER_PUID);
    }
}
