use std::collections::HashMap;

use gvl_bitstream::{Element, Record, Stream, UNABBREV_RECORD};
use gvl_container::{tag, Container};
use gvl_core::{ErrorRecord, FeatureFlags, LayerConfig, ViewScope};
use gvl_descriptor::{DescriptorWrite, PrmtEntry, SetId};
use gvl_frontend::opcodes::*;
use gvl_layer::DeviceState;
use gvl_report::Segment;

fn record(opcode: u64, operands: Vec<u64>) -> Element {
    Element::Record { abbrev_id: UNABBREV_RECORD, record: Record { opcode, operands, blob: None } }
}

/// Builds one minimal shader container, with a single buffer-load site when
/// `with_load` is set and a plain arithmetic body otherwise.
fn sample_container_bytes(with_load: bool) -> Vec<u8> {
    let body = if with_load {
        vec![
            record(REC_LITERAL, vec![0, 7]),
            record(REC_LOAD_BUFFER, vec![0, 0, 1]),
            record(REC_RETURN, vec![]),
        ]
    } else {
        vec![
            record(REC_LITERAL, vec![0, 7]),
            record(REC_LITERAL, vec![0, 3]),
            record(REC_ADD, vec![0, 0, 1]),
            record(REC_RETURN, vec![]),
        ]
    };

    let entry = gvl_bitstream::Block { id: BLOCK_ID_BASIC_BLOCK, abbrev_width: 2, elements: body };
    let function = gvl_bitstream::Block {
        id: BLOCK_ID_FUNCTION,
        abbrev_width: 2,
        elements: vec![record(REC_FUNCTION_HEADER, vec![0]), Element::SubBlock(entry)],
    };
    let module = gvl_bitstream::Block {
        id: BLOCK_ID_MODULE,
        abbrev_width: 2,
        elements: vec![record(REC_MODULE_HEADER, vec![1]), Element::SubBlock(function)],
    };
    let stream = Stream { magic: 0x4D4F4458, top_level: vec![module] };
    let module_bytes = gvl_bitstream::emit(&stream).unwrap();

    let mut known = HashMap::new();
    known.insert(tag::BITSTREAM_MODULE, module_bytes);
    let container = Container { identifier: 0x44584243, reserved: 0, known, unexposed: Vec::new() };
    gvl_container::compile(&container)
}

fn sample_view() -> ViewScope {
    ViewScope {
        base_mip: 0,
        mip_count: 1,
        base_slice: 0,
        slice_count: 1,
        base_width: 0,
        width: 16,
        format_id: 0,
        format_size: 4,
        element_count: 16,
    }
}

/// S1 (resource-bounds read): a dispatch feeding one out-of-bounds record
/// produces exactly one report message carrying the matching feature-id and
/// the accessed buffer's own PUID, resolved through the PRMT entry the
/// guard's resource-key payload names.
#[test]
fn s1_resource_bounds_read_produces_one_merged_message() {
    let device = DeviceState::new(LayerConfig::default());
    device.descriptors.allocate(SetId(1), 0);
    device.descriptors.write_prmt(SetId(1), 9, PrmtEntry { puid: 123, view: sample_view() });

    device.begin_report();
    let written = device.inject_ring_record(
        0,
        ErrorRecord::new(gvl_passes::resource_bounds::FEATURE_ID as u8, 42, 9),
    );
    assert!(written);

    let segment = Segment::new(0);
    device.complete_segment(&segment);
    device.end_step();
    let report = device.end_report();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].messages.len(), 1);
    let message = &report.steps[0].messages[0];
    assert_eq!(message.merged_count, 1);
    assert_eq!(message.feature_id, gvl_passes::resource_bounds::FEATURE_ID);
    assert_eq!(message.object.as_ref().unwrap().puid, 123);
}

/// Same shape as above, but the record's resource-key never got a PRMT
/// write -- the accessed descriptor was destroyed, or the key is stale --
/// so resolution must fall back to the reserved null buffer PUID rather
/// than panicking or inventing an object.
#[test]
fn s1_resource_bounds_read_falls_back_to_the_null_puid_when_unresolved() {
    let device = DeviceState::new(LayerConfig::default());
    device.begin_report();
    device.inject_ring_record(0, ErrorRecord::new(gvl_passes::resource_bounds::FEATURE_ID as u8, 42, 9));

    let segment = Segment::new(0);
    device.complete_segment(&segment);
    device.end_step();
    let report = device.end_report();

    let message = &report.steps[0].messages[0];
    assert_eq!(message.object.as_ref().unwrap().puid, gvl_core::NULL_BUFFER_PUID);
}

/// S2 (data-race read-after-write): two concurrent accesses to the same
/// shared resource within one submission surface both an "unsafe write" and
/// an "unsafe read" message once the data-race feature is active, each
/// resolving its lock-uid to the locked image's own PUID.
#[test]
fn s2_data_race_read_and_write_both_surface_with_correct_subtype_text() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::DATA_RACE, ..Default::default() });
    device.descriptors.allocate(SetId(1), 0);
    device.descriptors.write_prmt(SetId(1), 4, PrmtEntry { puid: 77, view: sample_view() });

    let pack = |resource_key: u32, subtype: u32| (resource_key << 1) | subtype;

    device.begin_report();
    device.inject_ring_record(
        0,
        ErrorRecord::new(gvl_passes::data_race::FEATURE_ID as u8, 1, pack(4, gvl_passes::data_race::SUBTYPE_UNSAFE_WRITE)),
    );
    device.inject_ring_record(
        0,
        ErrorRecord::new(gvl_passes::data_race::FEATURE_ID as u8, 2, pack(4, gvl_passes::data_race::SUBTYPE_UNSAFE_READ)),
    );

    let segment = Segment::new(0);
    device.complete_segment(&segment);
    device.end_step();
    let report = device.end_report();

    let texts: Vec<&str> = report.steps[0].messages.iter().map(|m| m.text.as_str()).collect();
    assert!(texts.contains(&"unsafe write while locked"));
    assert!(texts.contains(&"unsafe read while locked"));
    assert!(report.steps[0].messages.iter().all(|m| m.object.as_ref().unwrap().puid == 77));
}

/// S3 (round-trip): the empty pass set reproduces the original bytes
/// exactly, and enabling resource-bounds alone on a shader with no loads is
/// also a no-op.
#[test]
fn s3_empty_feature_set_round_trips_byte_exactly() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::empty(), ..Default::default() });
    let original = sample_container_bytes(true);
    let instrumented = device.instrument_shader(&original);
    assert_eq!(instrumented.bytes, original);
}

#[test]
fn s3_resource_bounds_alone_is_a_no_op_without_any_resource_access() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::RESOURCE_BOUNDS, ..Default::default() });
    let original = sample_container_bytes(false);
    let instrumented = device.instrument_shader(&original);
    assert_eq!(instrumented.bytes, original);
}

#[test]
fn s3_resource_bounds_does_instrument_an_actual_load() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::RESOURCE_BOUNDS, ..Default::default() });
    let original = sample_container_bytes(true);
    let instrumented = device.instrument_shader(&original);
    assert_ne!(instrumented.bytes, original);
}

/// S4 (cache hit): instrumenting the same bytes under the same feature set
/// twice returns byte-identical results, the externally observable half of
/// "exactly one rewrite invocation, the second lookup returns the cached
/// blob" (the condition-variable rendezvous itself is covered at the cache's
/// own unit level).
#[test]
fn s4_repeated_instrumentation_of_the_same_shader_is_deterministic() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::RESOURCE_BOUNDS, ..Default::default() });
    let original = sample_container_bytes(true);
    let first = device.instrument_shader(&original);
    let second = device.instrument_shader(&original);
    assert_eq!(first.bytes, second.bytes);
}

/// S5 (descriptor copy): copying N descriptors replicates both the PRMT
/// mapping and the tracked-write metadata for every copied slot.
#[test]
fn s5_copy_descriptors_replicates_prmt_and_tracked_metadata() {
    let device = DeviceState::new(LayerConfig::default());
    device.descriptors.allocate(SetId(1), 0);
    device.descriptors.allocate(SetId(2), 0);

    let writes = vec![DescriptorWrite { set: SetId(1), binding: 5, array_element: 0, payload: vec![7, 7] }];
    device.descriptors.update_descriptor_sets(&writes, &[], false).unwrap();
    device.descriptors.write_prmt(SetId(1), 5, PrmtEntry { puid: 11, view: sample_view() });

    device.descriptors.copy_descriptors(SetId(1), 5, SetId(2), 20, 1).unwrap();

    assert_eq!(device.descriptors.prmt_entry(SetId(2), 20), device.descriptors.prmt_entry(SetId(1), 5));
}

/// S6 (feature-set live switch): switching from F1 to F2 ⊃ F1 leaves every
/// valid set's commit-hash untouched (no user-descriptor write is
/// reissued), while the active pass set grows to match F2.
#[test]
fn s6_feature_set_change_leaves_commit_hashes_untouched() {
    let device = DeviceState::new(LayerConfig { features: FeatureFlags::RESOURCE_BOUNDS, ..Default::default() });
    device.descriptors.allocate(SetId(1), 0);
    let writes = vec![DescriptorWrite { set: SetId(1), binding: 0, array_element: 0, payload: vec![1, 2, 3] }];
    device.descriptors.update_descriptor_sets(&writes, &device.active_passes(), false).unwrap();
    let before = device.descriptors.commit_hash(SetId(1));

    device.change_feature_set(FeatureFlags::RESOURCE_BOUNDS | FeatureFlags::DATA_RACE);

    assert_eq!(device.descriptors.commit_hash(SetId(1)), before);
    assert_eq!(device.active_passes().len(), 2);
}
