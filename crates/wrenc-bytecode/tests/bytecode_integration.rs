//! Integration tests exercising a whole `CompiledModule` artifact: globals
//! table, class descriptors and stack map composed together and round
//! tripped through `encode`/`decode`, as a real loader would see them.

use wrenc_bytecode::class_descriptor::{self, Attribute, AttributeType, ClassCommand, ClassDescriptorBuilder};
use wrenc_bytecode::globals::{GlobalsTable, INIT_FUNC_KEY, MODULE_NAME_KEY};
use wrenc_bytecode::module::{flags, ClassSection, CompiledModule, Metadata, ModuleError};
use wrenc_bytecode::signature::{Signature, SignatureId, SignatureKind};
use wrenc_bytecode::stackmap::{StackMap, Statepoint};

fn dog_class_section() -> ClassSection {
    let mut b = ClassDescriptorBuilder::new();
    b.add_field("name");
    b.add_method("speak()", 2, false, false);
    b.add_method("new(_)", 0, true, false);
    b.add_attribute_group(
        "doc",
        -1,
        &[Attribute { name: "summary".into(), ty: AttributeType::String, payload_bits: 0, payload_str: Some("a dog".into()) }],
    );
    ClassSection { name: "Dog".into(), descriptor: b.finish() }
}

fn sample_artifact() -> CompiledModule {
    let mut globals = GlobalsTable::new();
    globals.insert("main", 0);
    globals.insert(INIT_FUNC_KEY, 0);
    globals.insert(MODULE_NAME_KEY, 0);

    let mut stack_map = StackMap::new();
    stack_map.add_function("main", 4).statepoints.push(Statepoint { instruction_offset: 0, live_slots: vec![0] });

    let mut module = CompiledModule::new(Metadata { module_name: "animals".into(), source_file: Some("animals.wren".into()) });
    module.globals_table = globals.encode();
    module.classes.push(dog_class_section());
    module.stack_map = Some(stack_map.encode());
    module
}

#[test]
fn full_artifact_roundtrips() {
    let module = sample_artifact();
    let bytes = module.encode();
    let decoded = CompiledModule::decode(&bytes).expect("decode should succeed");

    assert_eq!(decoded.metadata.module_name, "animals");
    assert_eq!(decoded.metadata.source_file.as_deref(), Some("animals.wren"));
    assert_eq!(decoded.classes.len(), 1);
    assert!(decoded.flags & flags::HAS_STACK_MAP != 0);

    let globals = GlobalsTable::decode(&decoded.globals_table).unwrap();
    assert_eq!(globals.get("main"), Some(0));
    assert_eq!(globals.init_func(), Some(0));

    let commands = class_descriptor::decode(&decoded.classes[0].descriptor).unwrap();
    assert!(commands.iter().any(|c| matches!(c, ClassCommand::AddField { name } if name == "name")));
    assert!(commands.iter().any(|c| matches!(c, ClassCommand::AddMethod { signature, .. } if signature == "speak()")));

    let stack_map = StackMap::decode(decoded.stack_map.as_deref().unwrap()).unwrap();
    assert_eq!(stack_map.functions[0].name, "main");
    assert_eq!(stack_map.lookup("main", 0).unwrap().live_slots, vec![0]);
}

#[test]
fn debug_info_flag_is_preserved() {
    let mut module = sample_artifact();
    module.flags |= flags::HAS_DEBUG_INFO;
    let bytes = module.encode();
    let decoded = CompiledModule::decode(&bytes).unwrap();
    assert!(decoded.flags & flags::HAS_DEBUG_INFO != 0);
}

#[test]
fn tampered_artifact_fails_checksum() {
    let mut bytes = sample_artifact().encode();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    assert!(matches!(CompiledModule::decode(&bytes), Err(ModuleError::ChecksumMismatch { .. })));
}

#[test]
fn signature_ids_are_stable_across_instances() {
    let a = Signature::new("speak", SignatureKind::Method, 0);
    let b = Signature::new("speak", SignatureKind::Method, 0);
    assert_eq!(a.id(), b.id());

    let different = Signature::new("speak", SignatureKind::Method, 1);
    assert_ne!(a.id(), different.id());
}

#[test]
fn signature_id_roundtrips_through_json() {
    let sig = Signature::new("speak", SignatureKind::Method, 0);
    let id: SignatureId = sig.id();
    let json = serde_json::to_string(&id).unwrap();
    let decoded: SignatureId = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, id);
}
