//! Backend contract (spec 4.I).
//!
//! Actual instruction selection for a target ISA is deliberately left as a
//! trait seam (`CodeEmitter`) — this crate owns everything the contract
//! specifies *about* codegen rather than codegen itself: the calling
//! convention (receiver, then unpacked upvalues, then params, in that
//! fixed order), virtual/super dispatch table construction, statepoint
//! recording at call sites, foreign-method stub registration, and
//! assembling the resulting object-module artifact via `wrenc_bytecode`.

use wrenc_bytecode::class_descriptor::ClassDescriptorBuilder;
use wrenc_bytecode::globals::{GlobalsTable, INIT_FUNC_KEY, MODULE_NAME_KEY, STACK_MAP_KEY};
use wrenc_bytecode::module::{ClassSection, CompiledModule, Metadata};
use wrenc_bytecode::signature::SignatureId;
use wrenc_bytecode::stackmap::{StackMap, Statepoint};

use crate::error::{InternalError, InternalResult};
use crate::ir::{ClassId, ClassInfo, Expr, FunctionId, IrFn, IrModule, Stmt};

/// One slot in a function's fixed calling convention, in ABI order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingSlot {
    /// The implicit `this`, present only when the function is a method.
    Receiver,
    Upvalue(crate::ir::UpvalueId),
    Param(crate::ir::LocalId),
}

/// The fixed ABI slot order for a function: receiver, then every upvalue
/// the function's closures may need unpacked from its upvalue pack, then
/// its declared parameters. A real code emitter reads this to know where
/// each value lives on entry.
pub fn calling_convention(func: &IrFn) -> Vec<CallingSlot> {
    let mut slots = Vec::with_capacity(1 + func.upvalues.len() + func.params.len());
    if func.is_method() {
        slots.push(CallingSlot::Receiver);
    }
    let mut upvalue_ids: Vec<_> = func.upvalues.keys().copied().collect();
    upvalue_ids.sort_by_key(|u| u.as_u32());
    slots.extend(upvalue_ids.into_iter().map(CallingSlot::Upvalue));
    slots.extend(func.params.iter().copied().map(CallingSlot::Param));
    slots
}

/// Seam a real native/bytecode code generator implements per function. Left
/// unimplemented here: instruction selection is out of this crate's scope,
/// which ends at the object-module/ABI contract.
pub trait CodeEmitter {
    fn emit_function(&mut self, module: &IrModule, func: &IrFn) -> InternalResult<()>;
}

/// Finds the method `signature` on `class_id`, or the first ancestor class
/// (reached through `parent` expressions that are statically known, i.e.
/// `Expr::GetClassVar`) that declares it. Returns `None` for a dynamic or
/// foreign-resolved parent the backend can't see through at compile time —
/// those dispatch purely at runtime via the class's own method table (4.J).
pub fn virtual_method_lookup(module: &IrModule, class_id: ClassId, signature: SignatureId) -> Option<FunctionId> {
    let mut current = Some(class_id);
    while let Some(id) = current {
        let class = module.class(id);
        if let Some(&func) = class.methods.get(&signature) {
            return Some(func);
        }
        current = static_parent(class);
    }
    None
}

/// As `virtual_method_lookup`, but starts the search at `class_id`'s parent
/// rather than at `class_id` itself — the lookup a `super.foo()` call site
/// needs (4.J: "dispatch starts at the declaring class's parent").
pub fn super_method_lookup(module: &IrModule, class_id: ClassId, signature: SignatureId) -> Option<FunctionId> {
    let class = module.class(class_id);
    let parent = static_parent(class)?;
    virtual_method_lookup(module, parent, signature)
}

fn static_parent(class: &ClassInfo) -> Option<ClassId> {
    match &class.parent {
        Some(Expr::GetClassVar(id)) => Some(*id),
        _ => None,
    }
}

/// Assembles a whole module's object artifact: one globals-table entry per
/// function plus the reserved init/module-name/stack-map keys, one class
/// descriptor per class, and a stack map recording a statepoint at every
/// call site. Function bodies themselves are referenced purely by index —
/// a code emitter plugs in the actual instructions for each index.
pub fn lower_module(module: &IrModule) -> InternalResult<CompiledModule> {
    let globals = build_globals_table(module)?;
    let stack_map = build_stack_map(module);
    let classes = module.classes.iter().map(build_class_section).collect::<InternalResult<Vec<_>>>()?;

    let mut compiled = CompiledModule::new(Metadata { module_name: module.name.clone(), source_file: None });
    compiled.globals_table = globals.encode();
    compiled.classes = classes;
    compiled.stack_map = Some(stack_map.encode());
    Ok(compiled)
}

fn build_globals_table(module: &IrModule) -> InternalResult<GlobalsTable> {
    let mut table = GlobalsTable::new();
    for (index, func) in module.functions.iter().enumerate() {
        table.insert(func.debug_name.clone(), index as u64);
    }
    // By construction the module's top-level script body is always pushed
    // first, before any of its nested functions or methods.
    if module.functions.is_empty() {
        return Err(InternalError::MissingBackendData(module.name.clone()));
    }
    table.insert(INIT_FUNC_KEY, 0);
    table.insert(MODULE_NAME_KEY, 0);
    table.insert(STACK_MAP_KEY, 0);
    Ok(table)
}

fn build_class_section(class: &ClassInfo) -> InternalResult<ClassSection> {
    let mut builder = ClassDescriptorBuilder::new();
    if class.is_foreign {
        builder.mark_foreign_class();
    }
    for field in &class.fields {
        builder.add_field(&field.name);
    }

    let mut methods: Vec<_> = class.methods.iter().collect();
    methods.sort_by_key(|(id, _)| id.0);
    for (sig_id, func) in methods {
        let sig = class
            .signatures
            .get(sig_id)
            .ok_or_else(|| InternalError::MissingBackendData(format!("{}::{}", class.name, sig_id)))?;
        builder.add_method(&sig.canonical(), func.as_u32(), false, class.is_foreign);
    }

    let mut statics: Vec<_> = class.static_methods.iter().collect();
    statics.sort_by_key(|(id, _)| id.0);
    for (sig_id, func) in statics {
        let sig = class
            .signatures
            .get(sig_id)
            .ok_or_else(|| InternalError::MissingBackendData(format!("{}::{}", class.name, sig_id)))?;
        builder.add_method(&sig.canonical(), func.as_u32(), true, class.is_foreign);
    }

    for attr in &class.attributes {
        // Grouped attributes are emitted one group command per (group) pair
        // carried on the class itself (method-scoped attribute groups are
        // attached during parsing and aren't modeled by `ClassAttribute`).
        builder.add_attribute_group(
            &attr.group,
            -1,
            &[wrenc_bytecode::class_descriptor::Attribute {
                name: attr.name.clone(),
                ty: wrenc_bytecode::class_descriptor::AttributeType::Boolean,
                payload_bits: 1,
                payload_str: None,
            }],
        );
    }

    Ok(ClassSection { name: class.name.clone(), descriptor: builder.finish() })
}

/// Walks every function's (already basic-block-split) body in statement
/// order, recording a statepoint at each call site. `live_slots` is a
/// conservative over-approximation — every SSA variable defined up to that
/// point in the function — rather than a precise liveness result; a true
/// liveness pass is future work, and over-reporting live slots only costs
/// the GC a few extra root scans, never correctness (4.L scans whatever the
/// stackmap lists).
fn build_stack_map(module: &IrModule) -> StackMap {
    let mut map = StackMap::new();
    for func in &module.functions {
        let mut statepoints = Vec::new();
        let mut offset = 0u32;
        let mut live: Vec<u16> = Vec::new();
        walk_call_sites(&func.body, &mut offset, &mut live, &mut statepoints);
        let entry = map.add_function(func.debug_name.clone(), func.locals.len() as u32 + func.ssa_vars.len() as u32);
        entry.statepoints = statepoints;
    }
    map
}

fn walk_call_sites(stmt: &Stmt, offset: &mut u32, live: &mut Vec<u16>, statepoints: &mut Vec<Statepoint>) {
    match stmt {
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                walk_call_sites(s, offset, live, statepoints);
            }
        }
        Stmt::Assign(target, expr) => {
            record_calls_in_expr(expr, *offset, live, statepoints);
            *offset += 1;
            if let crate::ir::VarDecl::Ssa(id) = target {
                live.push(id.as_u32() as u16);
            }
        }
        Stmt::FieldAssign { value, .. } => {
            record_calls_in_expr(value, *offset, live, statepoints);
            *offset += 1;
        }
        Stmt::EvalAndIgnore(expr) | Stmt::Return(expr) => {
            record_calls_in_expr(expr, *offset, live, statepoints);
            *offset += 1;
        }
        Stmt::Jump { condition: Some(expr), .. } => {
            record_calls_in_expr(expr, *offset, live, statepoints);
            *offset += 1;
        }
        _ => {}
    }
}

fn record_calls_in_expr(expr: &Expr, offset: u32, live: &[u16], statepoints: &mut Vec<Statepoint>) {
    if let Expr::FuncCall { receiver, args, .. } = expr {
        record_calls_in_expr(receiver, offset, live, statepoints);
        for a in args {
            record_calls_in_expr(a, offset, live, statepoints);
        }
        statepoints.push(Statepoint { instruction_offset: offset, live_slots: live.to_vec() });
    }
}
