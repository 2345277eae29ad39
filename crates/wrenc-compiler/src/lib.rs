//! Ahead-of-time IR, optimization passes and the backend contract for
//! wrenc (spec §§2-4): a per-module arena holding a tagged-variant IR tree,
//! a fixed cleanup -> basic-block -> SSA -> type-inference pass pipeline,
//! and the object-module assembly step that hands off to a native code
//! emitter.

pub mod arena;
pub mod backend;
pub mod error;
pub mod ir;
pub mod passes;
pub mod symtab;

pub use backend::{lower_module, CallingSlot, CodeEmitter};
pub use error::{CompileError, Diagnostic, Diagnostics, InternalError, InternalResult};
pub use ir::{IrFn, IrModule};
pub use symtab::{ClassScope, Resolution, ScopeStack};

/// Compiles one parsed module's IR all the way to an object-module
/// artifact: runs the pass pipeline over every function, then assembles
/// the result via [`backend::lower_module`]. Returns `Err` only for an
/// internal-invariant violation (spec §7); ordinary compile errors are
/// caught earlier, while the IR is still being built, and reported through
/// a [`Diagnostics`] sink rather than by this function.
pub fn compile_module(mut module: ir::IrModule) -> InternalResult<wrenc_bytecode::module::CompiledModule> {
    for func in module.functions.iter_mut() {
        passes::run_all(func);
    }
    backend::lower_module(&module)
}
