use std::collections::HashMap;
use std::collections::HashSet;

use gvl_core::{ErrorRecord, MessageKind, ObjectInfo, PayloadKey, ResourceResolver, SourceExtract, ValidationMessage};
use gvl_il::{Instruction, Opcode, Program, SourceSpan, Type, ValueId};

use crate::error::Result;
use crate::location::LocationRegistry;
use crate::pass::{DescriptorBinding, DescriptorBindingKind, Pass, PushConstantDecl, StorageDecl};
use crate::registry::PassUids;
use crate::rewrite::{find_site, guard_instruction, GuardIds, GuardSpec};
use gvl_core::StageFlags;

/// Record-decode feature-id for read/write data races on a shared resource
/// (§1, §8 S2).
pub const FEATURE_ID: u16 = 3;

/// [`ValidationMessage::error_subtype`] values this pass reports, packed
/// into the guard's payload literal at rewrite time since the actual
/// runtime comparison happens on the GPU, not in the IL (§1 non-goals:
/// "only the injected points need be correct").
pub const SUBTYPE_UNSAFE_WRITE: u32 = 0;
pub const SUBTYPE_UNSAFE_READ: u32 = 1;

/// The guard's payload packs the resource-key (the resource operand's own
/// PRMT token, same convention as [`crate::resource_bounds`]) into the high
/// bits and the subtype into the low bit, mirroring how the record's
/// lock-uid resolves host-side to the locked object's view-key: one `u32`
/// carries both "what kind of unsafe access" and "which resource", since
/// the record has no field of its own for the latter.
fn pack_payload(resource_key: u32, subtype: u32) -> u32 {
    (resource_key << 1) | (subtype & 1)
}

fn unpack_subtype(payload: u32) -> u32 {
    payload & 1
}

fn unpack_resource_key(payload: u32) -> u32 {
    payload >> 1
}

fn is_read(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::LoadBuffer | Opcode::LoadTexture)
}

fn is_write(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::StoreBuffer | Opcode::StoreTexture)
}

/// Detects concurrent read/write or write/write access to the same
/// resource element via a device-scope lock table keyed by element index,
/// with the lock *value* being the draw/dispatch-scoped invocation-shared
/// id (§3 "Shader-invocation-shared id", §5 "Lock table in GPU memory").
///
/// Write sites acquire the lock with an atomic compare-exchange against 0
/// (unlocked) or the calling invocation's own id (re-entrant from the same
/// draw is safe); on the safe path the lock is released with a plain
/// atomic store at the top of the post-block, matching §4.5's "matching
/// unlock is an atomic store at the top of post-block". Read sites only
/// check the lock is unlocked -- a concurrent reader never contends with
/// another reader.
pub struct DataRacePass {
    uids: PassUids,
    descriptors: [DescriptorBinding; 1],
    push_constants: [PushConstantDecl; 1],
    storage: [StorageDecl; 1],
}

impl DataRacePass {
    pub fn new() -> Self {
        DataRacePass {
            uids: PassUids::default(),
            descriptors: [DescriptorBinding {
                kind: DescriptorBindingKind::StorageTexelBuffer,
                count: 1,
                stages: StageFlags::GRAPHICS.union(StageFlags::COMPUTE),
            }],
            push_constants: [PushConstantDecl { dword_count: 1, stages: StageFlags::GRAPHICS.union(StageFlags::COMPUTE) }],
            storage: [StorageDecl { dwords_per_binding: 1 }],
        }
    }

    fn rewrite_write_site(
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

        let lock_ptr = program.allocate_value();
        let invocation_id = program.allocate_value();
        let zero_id = program.allocate_value();
        let previous_id = program.allocate_value();
        let eq_zero_id = program.allocate_value();
        let eq_self_id = program.allocate_value();
        let pred_id = program.allocate_value();
        let shift_amount_id = program.allocate_value();
        let subtype_id = program.allocate_value();
        let shifted_key_id = program.allocate_value();
        let payload_id = program.allocate_value();
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

        block.instructions.insert(
            inst_index,
            Instruction::new(Opcode::Undef)
                .with_result(lock_ptr, buffer_ty)
                .with_immediates([self.uids.storage_uid as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 1,
            Instruction::new(Opcode::Load)
                .with_result(invocation_id, u32_ty)
                .with_immediates([self.uids.push_constant_uid as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 2,
            Instruction::new(Opcode::Literal).with_result(zero_id, u32_ty).with_immediates([0]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 3,
            Instruction::new(Opcode::AtomicCompareExchange)
                .with_result(previous_id, u32_ty)
                .with_operands([lock_ptr, index, invocation_id, zero_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 4,
            Instruction::new(Opcode::Equal)
                .with_result(eq_zero_id, bool_ty)
                .with_operands([previous_id, zero_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 5,
            Instruction::new(Opcode::Equal)
                .with_result(eq_self_id, bool_ty)
                .with_operands([previous_id, invocation_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 6,
            Instruction::new(Opcode::Or)
                .with_result(pred_id, bool_ty)
                .with_operands([eq_zero_id, eq_self_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        // Payload = (resource-key << 1) | subtype, so `handle` can recover
        // both which resource this lock guarded and what kind of unsafe
        // access tripped it.
        block.instructions.insert(
            inst_index + 7,
            Instruction::new(Opcode::Literal).with_result(shift_amount_id, u32_ty).with_immediates([1]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 8,
            Instruction::new(Opcode::Literal)
                .with_result(subtype_id, u32_ty)
                .with_immediates([SUBTYPE_UNSAFE_WRITE as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 9,
            Instruction::new(Opcode::BitShiftLeft)
                .with_result(shifted_key_id, u32_ty)
                .with_operands([resource, shift_amount_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 10,
            Instruction::new(Opcode::BitOr)
                .with_result(payload_id, u32_ty)
                .with_operands([shifted_key_id, subtype_id])
                .with_span(SourceSpan::UNKNOWN),
        );

        let extract = SourceExtract { file_id: 0, line: span.start_bit as u32, column: 0, length: span.bit_len() as u32, snippet: None };
        let span_guid = locations.register(extract);

        let spec = GuardSpec { predicate: pred_id, payload: payload_id, feature_id: FEATURE_ID, span_guid, result: None };
        let ids = GuardIds { post: post_id, error: error_id, default_value, phi_result };
        let split = guard_instruction(function, block_index, inst_index + 11, spec, ids);

        // Unlock: an atomic store of 0 at the very top of the post-block,
        // ahead of the guarded store itself (§4.5).
        let post = function.block_mut(split.post).unwrap();
        post.instructions.insert(
            0,
            Instruction::new(Opcode::AtomicStore)
                .with_operands([lock_ptr, index, zero_id])
                .with_span(SourceSpan::UNKNOWN),
        );
    }

    fn rewrite_read_site(
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

        let lock_ptr = program.allocate_value();
        let zero_id = program.allocate_value();
        let lock_val = program.allocate_value();
        let pred_id = program.allocate_value();
        let shift_amount_id = program.allocate_value();
        let subtype_id = program.allocate_value();
        let shifted_key_id = program.allocate_value();
        let payload_id = program.allocate_value();
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
            Instruction::new(Opcode::Undef)
                .with_result(lock_ptr, buffer_ty)
                .with_immediates([self.uids.storage_uid as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 1,
            Instruction::new(Opcode::Literal).with_result(zero_id, u32_ty).with_immediates([0]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 2,
            Instruction::new(Opcode::AtomicLoad)
                .with_result(lock_val, u32_ty)
                .with_operands([lock_ptr, index])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 3,
            Instruction::new(Opcode::Equal)
                .with_result(pred_id, bool_ty)
                .with_operands([lock_val, zero_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 4,
            Instruction::new(Opcode::Literal).with_result(shift_amount_id, u32_ty).with_immediates([1]).with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 5,
            Instruction::new(Opcode::Literal)
                .with_result(subtype_id, u32_ty)
                .with_immediates([SUBTYPE_UNSAFE_READ as u64])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 6,
            Instruction::new(Opcode::BitShiftLeft)
                .with_result(shifted_key_id, u32_ty)
                .with_operands([resource, shift_amount_id])
                .with_span(SourceSpan::UNKNOWN),
        );
        block.instructions.insert(
            inst_index + 7,
            Instruction::new(Opcode::BitOr)
                .with_result(payload_id, u32_ty)
                .with_operands([shifted_key_id, subtype_id])
                .with_span(SourceSpan::UNKNOWN),
        );

        let extract = SourceExtract { file_id: 0, line: span.start_bit as u32, column: 0, length: span.bit_len() as u32, snippet: None };
        let span_guid = locations.register(extract);

        let result = if has_result { Some((access.result, access.result_type)) } else { None };
        let spec = GuardSpec { predicate: pred_id, payload: payload_id, feature_id: FEATURE_ID, span_guid, result };
        let ids = GuardIds { post: post_id, error: error_id, default_value, phi_result };
        guard_instruction(function, block_index, inst_index + 8, spec, ids);
    }
}

impl Default for DataRacePass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for DataRacePass {
    fn feature_id(&self) -> u16 {
        FEATURE_ID
    }

    fn bind_uids(&mut self, uids: PassUids) {
        self.uids = uids;
    }

    fn uids(&self) -> PassUids {
        self.uids
    }

    fn enumerate_descriptors(&self) -> &[DescriptorBinding] {
        &self.descriptors
    }

    fn enumerate_push_constants(&self) -> &[PushConstantDecl] {
        &self.push_constants
    }

    fn enumerate_storage(&self) -> &[StorageDecl] {
        &self.storage
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
                find_site(function, &instrumented, |inst| is_write(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            // Stores carry no result id; dedup on the operand identity of
            // the store instead so the sweep still terminates.
            let key = {
                let inst = &program.functions[function_index].blocks[block_index].instructions[inst_index];
                ValueId(inst.operands[0].0 ^ inst.operands[1].0.rotate_left(16))
            };
            self.rewrite_write_site(program, function_index, locations, block_index, inst_index);
            instrumented.insert(key);
        }

        let mut instrumented: HashSet<ValueId> = HashSet::new();
        loop {
            let site = {
                let function = &program.functions[function_index];
                find_site(function, &instrumented, |inst| is_read(inst.opcode))
            };
            let Some((block_index, inst_index)) = site else { break };
            let result = program.functions[function_index].blocks[block_index].instructions[inst_index].result;
            self.rewrite_read_site(program, function_index, locations, block_index, inst_index);
            instrumented.insert(result);
        }
        Ok(())
    }

    fn handle(&self, _command_version: u64, records: &[ErrorRecord], resolver: &dyn ResourceResolver) -> Vec<ValidationMessage> {
        let mut merged: HashMap<PayloadKey, (u32, u32)> = HashMap::new();
        for record in records.iter().filter(|r| r.feature_id as u16 == FEATURE_ID) {
            let key = PayloadKey { feature_id: record.feature_id, span_guid: record.span_guid, resource_key: record.payload };
            let entry = merged.entry(key).or_insert((0, record.payload));
            entry.0 += 1;
        }
        merged
            .into_iter()
            .map(|(key, (count, payload))| {
                let subtype = unpack_subtype(payload);
                let text = if subtype == SUBTYPE_UNSAFE_READ {
                    "unsafe read while locked"
                } else {
                    "unsafe write while locked"
                };
                let puid = resolver.resolve(unpack_resource_key(key.resource_key)).unwrap_or(gvl_core::NULL_TEXTURE_PUID);
                ValidationMessage {
                    kind: MessageKind::ValidationError,
                    merged_count: count,
                    feature_id: FEATURE_ID,
                    error_subtype: subtype,
                    text: text.to_string(),
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

    fn module_with_single_write() -> (Program, usize) {
        let mut program = Program::new();
        let mut f = Function::new("main", TypeId::INVALID);
        let resource = program.allocate_value();
        let index = program.allocate_value();
        let value = program.allocate_value();
        let mut block = BasicBlock::new(BlockId(0));
        block.instructions.push(
            Instruction::new(Opcode::StoreBuffer).with_operands([resource, index, value]).with_span(SourceSpan::new(0, 16)),
        );
        block.instructions.push(Instruction::new(Opcode::Return).with_span(SourceSpan::new(16, 24)));
        f.blocks.push(block);
        f.entry = BlockId(0);
        program.functions.push(f);
        (program, 0)
    }

    #[test]
    fn write_site_splits_and_unlocks_at_top_of_post() {
        let (mut program, function_index) = module_with_single_write();
        let pass = DataRacePass::new();
        let mut locations = LocationRegistry::new();
        pass.rewrite_function(&mut program, function_index, &mut locations).unwrap();

        let function = &program.functions[function_index];
        assert_eq!(function.blocks.len(), 3);
        assert_eq!(locations.len(), 1);
    }

    #[test]
    fn handle_reports_correct_subtype_text() {
        let pass = DataRacePass::new();
        let write_records = [ErrorRecord::new(FEATURE_ID as u8, 1, pack_payload(5, SUBTYPE_UNSAFE_WRITE))];
        let read_records = [ErrorRecord::new(FEATURE_ID as u8, 2, pack_payload(5, SUBTYPE_UNSAFE_READ))];
        assert_eq!(pass.handle(0, &write_records, &gvl_core::NullResolver)[0].text, "unsafe write while locked");
        assert_eq!(pass.handle(0, &read_records, &gvl_core::NullResolver)[0].text, "unsafe read while locked");
    }

    struct StubResolver;
    impl gvl_core::ResourceResolver for StubResolver {
        fn resolve(&self, resource_key: u32) -> Option<gvl_core::Puid> {
            (resource_key == 5).then_some(88)
        }
    }

    #[test]
    fn handle_resolves_the_locked_resource_key_to_a_view_puid() {
        let pass = DataRacePass::new();
        let records = [ErrorRecord::new(FEATURE_ID as u8, 1, pack_payload(5, SUBTYPE_UNSAFE_WRITE))];
        let messages = pass.handle(0, &records, &StubResolver);
        assert_eq!(messages[0].object.as_ref().unwrap().puid, 88);
    }
}
