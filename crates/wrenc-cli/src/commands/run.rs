//! `run`: links a compiled object-module artifact's class descriptors into
//! a fresh runtime `ClassRegistry`.
//!
//! Actually executing the linked module is out of this crate's scope —
//! instruction selection for a target ISA and executable linking/relocation
//! are named-only collaborators (spec §1) — so this command exercises the
//! same descriptor-decode and dispatch-table-construction path a real
//! loader runs and reports what it built rather than pretending to execute
//! user bytecode.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use wrenc_bytecode::class_descriptor::{self, ClassCommand};
use wrenc_bytecode::globals::GlobalsTable;
use wrenc_bytecode::module::CompiledModule;
use wrenc_bytecode::signature::Signature;
use wrenc_bytecode::stackmap::StackMap;
use wrenc_runtime::object::{ClassRegistry, MethodEntry, MethodKind, ObjClass};
use wrenc_sdk::{BuiltinModules, Configuration, WrenVM};

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(module: PathBuf, color: Option<String>) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(color.as_deref()));

    let bytes = fs::read(&module).with_context(|| format!("reading {}", module.display()))?;
    let compiled = CompiledModule::decode(&bytes).with_context(|| format!("decoding {}", module.display()))?;
    let globals = GlobalsTable::decode(&compiled.globals_table).context("decoding globals table")?;
    let stack_map = match &compiled.stack_map {
        Some(bytes) => Some(StackMap::decode(bytes).context("decoding stack map")?),
        None => None,
    };

    // Foreign methods resolve the way the runtime loader would (4.N):
    // built-in modules first, then an embedder's `bindForeignMethodFn` — we
    // have no embedder here, so this surfaces any foreign method a real
    // loader would refuse to link.
    let builtins = BuiltinModules::new();
    let vm = WrenVM::new(Configuration::default());
    let mut unresolved_foreign = Vec::new();

    let mut registry = ClassRegistry::new();
    for section in &compiled.classes {
        let (class, foreign_methods) = link_class(section)?;
        for (signature, is_static) in foreign_methods {
            if builtins.resolve(&vm, &compiled.metadata.module_name, &section.name, is_static, &signature).is_none() {
                unresolved_foreign.push(format!("{}.{}", section.name, signature));
            }
        }
        registry.register(class);
    }

    out.success("linked");
    out.plain(&format!(
        " {} ({} class{}, {} global{}{})\n",
        compiled.metadata.module_name,
        compiled.classes.len(),
        if compiled.classes.len() == 1 { "" } else { "es" },
        globals.entries.len(),
        if globals.entries.len() == 1 { "" } else { "s" },
        if stack_map.is_some() { ", stack map present" } else { "" },
    ));
    for unresolved in &unresolved_foreign {
        out.plain(&format!("  unresolved foreign method: {unresolved}\n"));
    }
    out.flush();
    Ok(())
}

fn link_class(section: &wrenc_bytecode::module::ClassSection) -> anyhow::Result<(ObjClass, Vec<(String, bool)>)> {
    let commands = class_descriptor::decode(&section.descriptor)
        .with_context(|| format!("decoding class descriptor for {}", section.name))?;

    let mut class = ObjClass::new(section.name.clone());
    let mut foreign_methods = Vec::new();
    for cmd in commands {
        match cmd {
            ClassCommand::AddField { .. } => class.field_count += 1,
            ClassCommand::AddMethod { signature, function_index, is_static, is_foreign } => {
                let sig = Signature::parse(&signature)
                    .with_context(|| format!("malformed signature {signature:?} on class {}", section.name))?;
                let kind = if is_foreign { MethodKind::Foreign } else { MethodKind::Native };
                class.add_method(sig.id(), MethodEntry { kind, function_id: function_index });
                if is_foreign {
                    foreign_methods.push((signature, is_static));
                }
            }
            ClassCommand::MarkForeignClass => class.is_foreign = true,
            ClassCommand::MarkSystemClass | ClassCommand::AddAttributeGroup { .. } => {}
        }
    }
    Ok((class, foreign_methods))
}
