//! `WrenVM` — the slot-stack embedding handle (spec 4.N, component N).
//!
//! Native functions never see engine internals. They receive a `&mut WrenVM`
//! and read/write arguments and the return value through slot-typed
//! accessors (`get_slot_double`, `set_slot_new_foreign`, ...) rather than by
//! name. Slot 0 is the receiver on entry and the return value on exit, as
//! the backend's generated call stub expects (4.N: "the return value is
//! taken from slot 0").
//!
//! Values that don't fit in a `NativeValue` directly (strings, byte
//! buffers, lists, maps, foreign instance storage) are kept in a small
//! per-VM side table rather than the engine's slab/GC heap (components K/L
//! live in `wrenc-runtime`, a separate crate this one deliberately doesn't
//! depend on) — the slot's `NativeValue` holds an opaque index into that
//! table. A real embedding wires `WrenVM` up to the running engine's heap;
//! this crate only owns the ABI contract.

use std::collections::HashMap;

use crate::error::{AbiResult, NativeError};
use crate::value::NativeValue;

/// Heap-side storage for slot contents that don't fit in a bare `NativeValue`.
enum HeapObj {
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<NativeValue>),
    Map(Vec<(NativeValue, NativeValue)>),
    Foreign(Box<[u8]>),
    Handle(String),
}

fn type_mismatch(expected: &'static str, slot: usize) -> NativeError {
    NativeError::TypeMismatch { expected: expected.into(), got: format!("slot {slot}") }
}

/// A native function bound to a foreign method (4.N).
pub type ForeignMethodFn = fn(&mut WrenVM);
/// Fills slot 0 with the newly allocated instance, typically via
/// [`WrenVM::set_slot_new_foreign`].
pub type ForeignAllocateFn = fn(&mut WrenVM);
/// Runs when a foreign instance becomes unreachable; receives its foreign
/// data block.
pub type ForeignFinalizeFn = fn(&mut [u8]);

/// The `{ allocate, finalize }` pair a foreign class binds (4.N).
#[derive(Clone, Copy)]
pub struct ForeignClassMethods {
    pub allocate: Option<ForeignAllocateFn>,
    pub finalize: Option<ForeignFinalizeFn>,
}

/// Embedder hook resolving `(module, class, is_static, signature)` to a
/// foreign method implementation.
pub trait BindForeignMethodFn: Send + Sync {
    fn bind(&self, module: &str, class: &str, is_static: bool, signature: &str) -> Option<ForeignMethodFn>;
}

/// Embedder hook resolving `(module, class)` to a foreign class's
/// allocate/finalize pair.
pub trait BindForeignClassFn: Send + Sync {
    fn bind(&self, module: &str, class: &str) -> Option<ForeignClassMethods>;
}

/// Embedding configuration (4.N / §6 "Embedding API surface"): the
/// callbacks an embedder supplies before creating a VM.
#[derive(Default)]
pub struct Configuration {
    pub bind_foreign_method: Option<Box<dyn BindForeignMethodFn>>,
    pub bind_foreign_class: Option<Box<dyn BindForeignClassFn>>,
    pub error_fn: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub write_fn: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

/// Per-embedding context carrying the slot-stack native functions read and
/// write through (4.N: "a small per-embedding context carrying a
/// slot-stack").
pub struct WrenVM {
    slots: Vec<NativeValue>,
    heap: Vec<HeapObj>,
    config: Configuration,
    /// Set by `abort_fiber` (§7: "Foreign methods that need non-fatal
    /// failure use `wrenAbortFiber(slot)`"); observed by `wrenCall` as a
    /// non-success result rather than aborting the process.
    aborted: Option<NativeValue>,
}

impl WrenVM {
    pub fn new(config: Configuration) -> Self {
        Self { slots: Vec::new(), heap: Vec::new(), config, aborted: None }
    }

    /// Marks the current fiber as aborted with the error value in `slot`.
    pub fn abort_fiber(&mut self, slot: usize) -> AbiResult<()> {
        self.aborted = Some(self.slot(slot)?);
        Ok(())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Grows the slot stack so at least `count` slots exist, newly added
    /// ones holding `null`.
    pub fn ensure_slots(&mut self, count: usize) {
        if self.slots.len() < count {
            self.slots.resize(count, NativeValue::null());
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, slot: usize) -> AbiResult<NativeValue> {
        self.slots.get(slot).copied().ok_or_else(|| NativeError::ArgumentError(format!("slot {slot} out of range")))
    }

    fn heap_obj(&self, slot: usize) -> AbiResult<&HeapObj> {
        let id = self.slot(slot)?.as_u64().ok_or_else(|| type_mismatch("heap reference", slot))?;
        self.heap.get(id as usize).ok_or_else(|| type_mismatch("heap reference", slot))
    }

    fn push_heap(&mut self, slot: usize, obj: HeapObj) {
        let id = self.heap.len();
        self.heap.push(obj);
        self.slots[slot] = NativeValue::u64(id as u64);
    }

    // -- bool -----------------------------------------------------------

    pub fn get_slot_bool(&self, slot: usize) -> AbiResult<bool> {
        self.slot(slot)?.as_bool().ok_or_else(|| type_mismatch("bool", slot))
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) {
        self.slots[slot] = NativeValue::bool(value);
    }

    // -- double -----------------------------------------------------------

    pub fn get_slot_double(&self, slot: usize) -> AbiResult<f64> {
        self.slot(slot)?.as_f64().ok_or_else(|| type_mismatch("double", slot))
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) {
        self.slots[slot] = NativeValue::f64(value);
    }

    // -- null -----------------------------------------------------------

    pub fn get_slot_is_null(&self, slot: usize) -> AbiResult<bool> {
        Ok(self.slot(slot)?.is_null())
    }

    pub fn set_slot_null(&mut self, slot: usize) {
        self.slots[slot] = NativeValue::null();
    }

    // -- bytes / string -----------------------------------------------------------

    pub fn get_slot_bytes(&self, slot: usize) -> AbiResult<&[u8]> {
        match self.heap_obj(slot)? {
            HeapObj::Bytes(b) => Ok(b),
            _ => Err(type_mismatch("bytes", slot)),
        }
    }

    pub fn set_slot_bytes(&mut self, slot: usize, data: &[u8]) {
        self.push_heap(slot, HeapObj::Bytes(data.to_vec()));
    }

    pub fn get_slot_string(&self, slot: usize) -> AbiResult<&str> {
        match self.heap_obj(slot)? {
            HeapObj::Str(s) => Ok(s.as_str()),
            _ => Err(type_mismatch("string", slot)),
        }
    }

    pub fn set_slot_string(&mut self, slot: usize, value: &str) {
        self.push_heap(slot, HeapObj::Str(value.to_string()));
    }

    // -- foreign -----------------------------------------------------------

    /// Allocates `size` bytes of foreign instance data and stores it in
    /// `slot`, returning a handle to the backing bytes (4.N /
    /// `wrenSetSlotNewForeign`). Scenario 6: "the returned pointer equals
    /// the trailing-field address of the managed object."
    pub fn set_slot_new_foreign(&mut self, slot: usize, size: usize) -> &mut [u8] {
        self.push_heap(slot, HeapObj::Foreign(vec![0u8; size].into_boxed_slice()));
        match self.heap.last_mut().unwrap() {
            HeapObj::Foreign(buf) => buf,
            _ => unreachable!(),
        }
    }

    pub fn get_slot_foreign(&self, slot: usize) -> AbiResult<&[u8]> {
        match self.heap_obj(slot)? {
            HeapObj::Foreign(b) => Ok(b),
            _ => Err(type_mismatch("foreign", slot)),
        }
    }

    pub fn get_slot_foreign_mut(&mut self, slot: usize) -> AbiResult<&mut [u8]> {
        let id = self.slot(slot)?.as_u64().ok_or_else(|| type_mismatch("foreign", slot))? as usize;
        match self.heap.get_mut(id) {
            Some(HeapObj::Foreign(b)) => Ok(b),
            _ => Err(type_mismatch("foreign", slot)),
        }
    }

    // -- list -----------------------------------------------------------

    pub fn set_slot_new_list(&mut self, slot: usize) {
        self.push_heap(slot, HeapObj::List(Vec::new()));
    }

    pub fn get_list_count(&self, slot: usize) -> AbiResult<usize> {
        match self.heap_obj(slot)? {
            HeapObj::List(l) => Ok(l.len()),
            _ => Err(type_mismatch("list", slot)),
        }
    }

    pub fn insert_in_list(&mut self, slot: usize, index: usize, value: NativeValue) -> AbiResult<()> {
        let id = self.slot(slot)?.as_u64().ok_or_else(|| type_mismatch("list", slot))? as usize;
        match self.heap.get_mut(id) {
            Some(HeapObj::List(l)) => {
                let index = index.min(l.len());
                l.insert(index, value);
                Ok(())
            }
            _ => Err(type_mismatch("list", slot)),
        }
    }

    pub fn get_list_element(&self, slot: usize, index: usize) -> AbiResult<NativeValue> {
        match self.heap_obj(slot)? {
            HeapObj::List(l) => l.get(index).copied().ok_or_else(|| NativeError::ArgumentError(format!("list index {index} out of range"))),
            _ => Err(type_mismatch("list", slot)),
        }
    }

    // -- map -----------------------------------------------------------

    pub fn set_slot_new_map(&mut self, slot: usize) {
        self.push_heap(slot, HeapObj::Map(Vec::new()));
    }

    pub fn get_map_count(&self, slot: usize) -> AbiResult<usize> {
        match self.heap_obj(slot)? {
            HeapObj::Map(m) => Ok(m.len()),
            _ => Err(type_mismatch("map", slot)),
        }
    }

    pub fn set_map_value(&mut self, slot: usize, key: NativeValue, value: NativeValue) -> AbiResult<()> {
        let id = self.slot(slot)?.as_u64().ok_or_else(|| type_mismatch("map", slot))? as usize;
        match self.heap.get_mut(id) {
            Some(HeapObj::Map(m)) => {
                if let Some(entry) = m.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = value;
                } else {
                    m.push((key, value));
                }
                Ok(())
            }
            _ => Err(type_mismatch("map", slot)),
        }
    }

    // -- handles -----------------------------------------------------------

    /// Makes an opaque call handle for `signature`, persisted across calls
    /// (6: "make/call method handle; release handle").
    pub fn make_call_handle(&mut self, slot: usize, signature: &str) {
        self.push_heap(slot, HeapObj::Handle(signature.to_string()));
    }

    pub fn handle_signature(&self, slot: usize) -> AbiResult<&str> {
        match self.heap_obj(slot)? {
            HeapObj::Handle(s) => Ok(s.as_str()),
            _ => Err(type_mismatch("handle", slot)),
        }
    }
}

/// Per-call-site cache slot the backend's generated stub owns (4.N:
/// "resolves the native pointer on first call, caches it in cache_slot").
#[derive(Default)]
pub struct ForeignMethodCache(Option<ForeignMethodFn>);

impl ForeignMethodCache {
    pub fn empty() -> Self {
        Self(None)
    }
}

/// The foreign-call sequence the backend's generated stub performs (4.N):
/// resolve `stub` on first call and cache it, then invoke it with `vm`, then
/// read the result back out of slot 0.
pub fn call_foreign_method(vm: &mut WrenVM, cache: &mut ForeignMethodCache, stub: ForeignMethodFn) -> AbiResult<NativeValue> {
    let resolved = *cache.0.get_or_insert(stub);
    resolved(vm);
    vm.slot(0)
}

/// Calls a foreign class's allocator, landing the new instance in slot 0
/// (§3 "Foreign allocation": `alloc_foreign_obj` "calls the class's foreign
/// allocator callback, which uses the slot-stack API ... to place the new
/// instance in slot 0").
pub fn alloc_foreign_obj(vm: &mut WrenVM, allocate: ForeignAllocateFn) -> AbiResult<NativeValue> {
    vm.ensure_slots(1);
    allocate(vm);
    vm.slot(0)
}

/// Resolves a foreign method the way the runtime loader does (4.N): built-in
/// modules registered at compile time first, then the embedder's
/// `bindForeignMethodFn`.
pub fn resolve_foreign_method(
    builtins: &HashMap<(String, String, bool, String), ForeignMethodFn>,
    vm: &WrenVM,
    module: &str,
    class: &str,
    is_static: bool,
    signature: &str,
) -> Option<ForeignMethodFn> {
    let key = (module.to_string(), class.to_string(), is_static, signature.to_string());
    if let Some(&f) = builtins.get(&key) {
        return Some(f);
    }
    vm.config.bind_foreign_method.as_ref()?.bind(module, class, is_static, signature)
}
