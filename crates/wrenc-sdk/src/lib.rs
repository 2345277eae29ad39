//! wrenc SDK — embedding and foreign-method ABI for host applications.
//!
//! This crate provides the types needed to write native (foreign) modules
//! for wrenc without linking against `wrenc-runtime` directly: a foreign
//! method programs against [`WrenVM`]'s slot-stack accessors, and the
//! engine supplies the concrete VM at link time (spec 4.N, component N).
//!
//! # Example
//!
//! ```ignore
//! use wrenc_sdk::{WrenVM, BuiltinModules};
//!
//! fn add(vm: &mut WrenVM) {
//!     let result = vm.get_slot_double(1).unwrap() + vm.get_slot_double(2).unwrap();
//!     vm.set_slot_double(0, result);
//! }
//!
//! fn register(modules: &mut BuiltinModules) {
//!     modules.register("math", "Num", false, "add(_,_)", add);
//! }
//! ```

#![warn(missing_docs)]

use std::collections::HashMap;

pub mod convert;
pub mod error;
pub mod value;
pub mod vm;

pub use convert::{FromSlots, ToSlot};
pub use error::{AbiResult, NativeError};
pub use value::NativeValue;
pub use vm::{
    alloc_foreign_obj, call_foreign_method, resolve_foreign_method, BindForeignClassFn, BindForeignMethodFn,
    Configuration, ForeignAllocateFn, ForeignClassMethods, ForeignFinalizeFn, ForeignMethodCache, ForeignMethodFn,
    WrenVM,
};

/// Built-in foreign modules registered at compile time — the first lookup
/// stage a foreign call goes through, before the embedder's
/// `bindForeignMethodFn` (4.N: "Lookup of a foreign method proceeds in
/// order: built-in foreign modules registered at compile time → embedder-
/// provided `bindForeignMethodFn`").
#[derive(Default)]
pub struct BuiltinModules {
    methods: HashMap<(String, String, bool, String), ForeignMethodFn>,
    classes: HashMap<(String, String), ForeignClassMethods>,
}

impl BuiltinModules {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a foreign method, keyed by the same `(module, class,
    /// is_static, signature)` tuple the class descriptor's `ADD_METHOD`
    /// command resolves against at link time.
    pub fn register(&mut self, module: &str, class: &str, is_static: bool, signature: &str, func: ForeignMethodFn) {
        self.methods.insert((module.to_string(), class.to_string(), is_static, signature.to_string()), func);
    }

    /// Registers a foreign class's allocate/finalize pair.
    pub fn register_class(&mut self, module: &str, class: &str, methods: ForeignClassMethods) {
        self.classes.insert((module.to_string(), class.to_string()), methods);
    }

    /// Looks up a built-in foreign method, falling back to `vm`'s
    /// configured `bindForeignMethodFn` if this registry has no entry.
    pub fn resolve(&self, vm: &WrenVM, module: &str, class: &str, is_static: bool, signature: &str) -> Option<ForeignMethodFn> {
        resolve_foreign_method(&self.methods, vm, module, class, is_static, signature)
    }

    /// Looks up a built-in foreign class's allocate/finalize pair, falling
    /// back to `vm`'s configured `bindForeignClassFn`.
    pub fn resolve_class(&self, vm: &WrenVM, module: &str, class: &str) -> Option<ForeignClassMethods> {
        let key = (module.to_string(), class.to_string());
        if let Some(&methods) = self.classes.get(&key) {
            return Some(methods);
        }
        vm.config().bind_foreign_class.as_ref()?.bind(module, class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_it(vm: &mut WrenVM) {
        let n = vm.get_slot_double(1).unwrap();
        vm.set_slot_double(0, n * 2.0);
    }

    #[test]
    fn builtin_module_resolves_before_embedder_hook() {
        let mut modules = BuiltinModules::new();
        modules.register("math", "Num", false, "double(_)", double_it);

        let vm = WrenVM::new(Configuration::default());
        let resolved = modules.resolve(&vm, "math", "Num", false, "double(_)");
        assert!(resolved.is_some());
        assert!(modules.resolve(&vm, "math", "Num", false, "triple(_)").is_none());
    }
}
