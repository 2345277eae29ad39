//! `debug`: dumps the internals the rest of the pipeline produces — an
//! IR module (optionally after the pass pipeline has run) or a compiled
//! object-module's decoded globals table, class descriptors and stack map —
//! for inspecting what a build actually did.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use wrenc_bytecode::class_descriptor;
use wrenc_bytecode::globals::GlobalsTable;
use wrenc_bytecode::module::CompiledModule;
use wrenc_bytecode::stackmap::StackMap;
use wrenc_compiler::ir::IrModule;

/// Dumps a JSON-encoded IR module, either as parsed or after the pass
/// pipeline (cleanup, basic-block splitting, SSA, type inference) has run.
pub fn execute_ir(input: PathBuf, after_passes: bool) -> anyhow::Result<()> {
    let text = fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
    let mut module: IrModule =
        serde_json::from_str(&text).with_context(|| format!("parsing IR module {}", input.display()))?;
    if after_passes {
        for func in module.functions.iter_mut() {
            wrenc_compiler::passes::run_all(func);
        }
    }
    println!("{module:#?}");
    Ok(())
}

/// Dumps a compiled `.wrnc` object-module's decoded sections.
pub fn execute_module(input: PathBuf) -> anyhow::Result<()> {
    let bytes = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let compiled = CompiledModule::decode(&bytes).with_context(|| format!("decoding {}", input.display()))?;

    println!("module: {}", compiled.metadata.module_name);
    if let Some(source) = &compiled.metadata.source_file {
        println!("source: {source}");
    }

    let globals = GlobalsTable::decode(&compiled.globals_table).context("decoding globals table")?;
    println!("globals:");
    for entry in &globals.entries {
        println!("  {} -> {}", entry.name, entry.target);
    }

    for section in &compiled.classes {
        println!("class {}:", section.name);
        let commands = class_descriptor::decode(&section.descriptor)
            .with_context(|| format!("decoding class descriptor for {}", section.name))?;
        for cmd in commands {
            println!("  {cmd:?}");
        }
    }

    if let Some(bytes) = &compiled.stack_map {
        let stack_map = StackMap::decode(bytes).context("decoding stack map")?;
        println!("stack map:");
        for func in &stack_map.functions {
            println!("  {} ({} statepoint(s))", func.name, func.statepoints.len());
        }
    }

    Ok(())
}
