//! `check`: runs the pass pipeline and backend contract over a serialized
//! IR module and reports whether it compiles, without writing an
//! object-module artifact to disk.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use wrenc_compiler::ir::IrModule;

use crate::output::{resolve_color_choice, StyledOutput};

pub fn execute(inputs: Vec<PathBuf>, color: Option<String>) -> anyhow::Result<()> {
    let mut out = StyledOutput::new(resolve_color_choice(color.as_deref()));
    let mut failed = false;
    for input in &inputs {
        match check_one(input) {
            Ok(()) => {
                out.success("ok");
                out.plain(&format!(" {}\n", input.display()));
            }
            Err(err) => {
                failed = true;
                out.stderr_error(&format!("error: {}: {err:#}\n", input.display()));
            }
        }
    }
    out.flush();
    if failed {
        bail!("check failed");
    }
    Ok(())
}

fn check_one(input: &PathBuf) -> anyhow::Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let module: IrModule =
        serde_json::from_str(&text).with_context(|| format!("parsing IR module {}", input.display()))?;
    wrenc_compiler::compile_module(module)
        .map(|_| ())
        .with_context(|| format!("checking {}", input.display()))
}
