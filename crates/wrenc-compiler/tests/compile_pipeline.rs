//! End-to-end coverage of the pass pipeline + backend contract over a
//! hand-built IR module, and of the JSON encoding that stands in for a
//! frontend handoff (see `wrenc-cli`'s `build`/`check`/`debug` commands).

use wrenc_bytecode::class_descriptor::{self, ClassCommand};
use wrenc_bytecode::signature::{Signature, SignatureKind};
use wrenc_compiler::ir::{CcValue, ClassInfo, Expr, FunctionId, IrFn, IrModule, Stmt};
use wrenc_runtime::object::{ClassRegistry, MethodEntry, MethodKind, ObjClass};

fn returns_42() -> IrFn {
    IrFn {
        id: FunctionId::new(0),
        debug_name: "main".into(),
        params: Vec::new(),
        locals: Vec::new(),
        upvalues: Default::default(),
        ssa_vars: Vec::new(),
        body: Stmt::Block {
            stmts: vec![Stmt::Return(Expr::Const(CcValue::Int(42)))],
            is_basic_block: false,
            owner: None,
        },
        enclosing_class: None,
        root_begin_upvalues: None,
    }
}

fn sample_module() -> IrModule {
    let mut module = IrModule::new("main_module");
    module.push_function(|id| {
        let mut f = returns_42();
        f.id = id;
        f
    });
    module
}

#[test]
fn compiles_a_minimal_module() {
    let module = sample_module();
    let compiled = wrenc_compiler::compile_module(module).expect("compile_module should succeed");
    assert_eq!(compiled.classes.len(), 0);
    assert!(!compiled.globals_table.is_empty());
}

#[test]
fn run_all_leaves_body_as_basic_blocks() {
    let mut f = returns_42();
    wrenc_compiler::passes::run_all(&mut f);
    match &f.body {
        Stmt::Block { stmts, is_basic_block, .. } => {
            assert!(!is_basic_block, "function body itself is not a basic block");
            assert!(!stmts.is_empty());
        }
        other => panic!("expected a Block, got {other:?}"),
    }
}

#[test]
fn ir_module_roundtrips_through_json() {
    let module = sample_module();
    let json = serde_json::to_string(&module).expect("serialize IrModule");
    let decoded: IrModule = serde_json::from_str(&json).expect("deserialize IrModule");

    assert_eq!(decoded.name, module.name);
    assert_eq!(decoded.functions.len(), module.functions.len());
    assert_eq!(decoded.functions[0].debug_name, "main");
}

#[test]
fn compile_module_accepts_json_roundtripped_input() {
    let module = sample_module();
    let json = serde_json::to_string(&module).unwrap();
    let decoded: IrModule = serde_json::from_str(&json).unwrap();

    let compiled = wrenc_compiler::compile_module(decoded).expect("compile_module should succeed");
    assert!(!compiled.globals_table.is_empty());
}

#[test]
fn class_descriptor_survives_compile_and_decode() {
    let mut module = sample_module();
    let init_fn = FunctionId::new(module.functions.len() as u32);
    let sig = Signature { name: "speak".into(), kind: SignatureKind::Method, arity: 0 };
    module.push_function(|id| {
        let mut f = returns_42();
        f.id = id;
        f.debug_name = "Dog::speak()".into();
        f
    });
    module.push_class(|id| {
        let mut class = ClassInfo::new(id, "Dog");
        class.methods.insert(sig.id(), init_fn);
        class.signatures.insert(sig.id(), sig.clone());
        class
    });

    let compiled = wrenc_compiler::compile_module(module).expect("compile_module should succeed");
    assert_eq!(compiled.classes.len(), 1);
    assert_eq!(compiled.classes[0].name, "Dog");

    let commands = class_descriptor::decode(&compiled.classes[0].descriptor).expect("decode class descriptor");
    assert!(commands.iter().any(|cmd| matches!(
        cmd,
        ClassCommand::AddMethod { signature, .. } if signature == "speak()"
    )));
}

/// Compiles a class-bearing module and relinks its descriptor into a fresh
/// runtime `ClassRegistry`, the same path `wrenc-cli run` takes over a
/// decoded `.wrnc` artifact.
#[test]
fn compiled_class_links_into_runtime_registry() {
    let mut module = sample_module();
    let init_fn = FunctionId::new(module.functions.len() as u32);
    let sig = Signature { name: "speak".into(), kind: SignatureKind::Method, arity: 0 };
    module.push_function(|id| {
        let mut f = returns_42();
        f.id = id;
        f.debug_name = "Dog::speak()".into();
        f
    });
    module.push_class(|id| {
        let mut class = ClassInfo::new(id, "Dog");
        class.methods.insert(sig.id(), init_fn);
        class.signatures.insert(sig.id(), sig.clone());
        class
    });

    let compiled = wrenc_compiler::compile_module(module).expect("compile_module should succeed");
    let section = &compiled.classes[0];
    let commands = class_descriptor::decode(&section.descriptor).expect("decode class descriptor");

    let mut class = ObjClass::new(section.name.clone());
    for cmd in commands {
        if let ClassCommand::AddMethod { signature, function_index, is_foreign, .. } = cmd {
            let resolved = Signature::parse(&signature).expect("valid signature");
            let kind = if is_foreign { MethodKind::Foreign } else { MethodKind::Native };
            class.add_method(resolved.id(), MethodEntry { kind, function_id: function_index });
        }
    }

    let mut registry = ClassRegistry::new();
    let class_id = registry.register(class);
    let linked = registry.get(class_id).expect("class should be registered");
    assert_eq!(linked.name, "Dog");
    assert!(linked.methods.contains_key(&sig.id()));
}
