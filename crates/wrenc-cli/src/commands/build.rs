//! `build`: compiles a serialized IR module down to an object-module
//! artifact (spec §6 "CLI": input path, debug-info emission, GC-support
//! enable) and writes it to the output directory.
//!
//! Lexing and parsing of source text are named-only collaborators (spec §1)
//! this crate never implements, so the input here is the IR a frontend would
//! hand off: a JSON-encoded `wrenc_compiler::ir::IrModule`, matching the
//! `serde`-based debug-dump convention already used for snapshot testing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use wrenc_bytecode::module::flags;
use wrenc_compiler::ir::IrModule;

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(inputs: Vec<PathBuf>, out_dir: PathBuf, debug_info: bool, color: Option<String>) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(color.as_deref()));
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut failed = false;
    for input in &inputs {
        match build_one(input, &out_dir, debug_info) {
            Ok(written) => {
                out.success("built");
                out.plain(&format!(" {} -> {}\n", input.display(), written.display()));
            }
            Err(err) => {
                failed = true;
                out.stderr_error(&format!("error: {}: {err:#}\n", input.display()));
            }
        }
    }
    out.flush();
    if failed {
        bail!("build failed");
    }
    Ok(())
}

fn build_one(input: &Path, out_dir: &Path, debug_info: bool) -> anyhow::Result<PathBuf> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let module: IrModule =
        serde_json::from_str(&text).with_context(|| format!("parsing IR module {}", input.display()))?;
    let name = module.name.clone();

    let mut compiled =
        wrenc_compiler::compile_module(module).with_context(|| format!("compiling {}", input.display()))?;
    if debug_info {
        compiled.flags |= flags::HAS_DEBUG_INFO;
    }
    let out_path = out_dir.join(format!("{name}.wrnc"));
    fs::write(&out_path, compiled.encode()).with_context(|| format!("writing {}", out_path.display()))?;
    Ok(out_path)
}
