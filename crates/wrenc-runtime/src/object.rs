//! Runtime object model (spec 4.J, component J): `Obj` header, the
//! `ObjClass`/metaclass graph, and virtual/super method dispatch.
//!
//! Every heap value (string, list, managed instance, class...) begins with
//! an [`ObjHeader`]: a class pointer and a GC word. Layout is `#[repr(C)]`
//! so the slab allocator (component K) can place one directly at the start
//! of a raw allocation and the GC (component L) can find it from any live
//! `Value` pointer without type-specific knowledge.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::value::Value;
use wrenc_bytecode::signature::SignatureId;

/// GC mark color. Toggled wholesale between collection cycles (4.L) so marks
/// from the previous cycle become automatically stale without a sweep of
/// color bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcColor {
    White0,
    White1,
}

impl GcColor {
    pub fn flip(self) -> GcColor {
        match self {
            GcColor::White0 => GcColor::White1,
            GcColor::White1 => GcColor::White0,
        }
    }
}

/// Coarse shape tag used only by the GC tracer (4.L) to know which trace
/// callback applies, standing in for per-class native trace vtables: leaf
/// kinds (`StringLeaf`, `BoolLeaf`) trace nothing, container kinds trace
/// their contained `Value`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    Managed,
    List,
    Map,
    Range,
    Fn,
    Fiber,
    Class,
    StringLeaf,
    BoolLeaf,
}

/// Header present at the start of every heap-allocated object.
#[repr(C)]
#[derive(Debug)]
pub struct ObjHeader {
    /// Pointer (as a `Value`) to this object's class. For `ObjClass` itself,
    /// this is its metaclass.
    pub class: Value,
    /// Current mark color; compared against the collector's live color to
    /// decide reachability.
    pub color: GcColor,
    /// Set once the object has been identified as a root member this cycle,
    /// to avoid re-queuing it onto the grey queue.
    pub queued: bool,
    /// What kind of container this is, for tracing purposes.
    pub kind: ObjKind,
}

impl ObjHeader {
    pub fn new(class: Value, color: GcColor) -> Self {
        Self { class, color, queued: false, kind: ObjKind::Managed }
    }

    pub fn with_kind(class: Value, color: GcColor, kind: ObjKind) -> Self {
        Self { class, color, queued: false, kind }
    }
}

/// What kind of native implementation a method slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Index into the owning module's function table (component I).
    Native,
    /// Resolved lazily through the foreign-method bridge (component N).
    Foreign,
}

/// One entry of a class's method table.
#[derive(Debug, Clone, Copy)]
pub struct MethodEntry {
    pub kind: MethodKind,
    /// Index into the defining module's compiled function table, or, for
    /// `Foreign` methods, a cache slot index resolved on first call.
    pub function_id: u32,
}

/// Opaque handle identifying an `ObjClass` in the [`ClassRegistry`]. Classes
/// are permanent for process lifetime (spec §5), so unlike other heap
/// objects they are addressed by a stable index rather than by their
/// NaN-boxed pointer alone, which keeps the registry's binary-search-free
/// lookups (by name, at `init_class` time) simple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Runtime representation of a class (`ObjClass`, spec §3).
#[derive(Debug)]
pub struct ObjClass {
    pub header: ObjHeader,
    pub name: String,
    pub parent: Option<ClassId>,
    pub metaclass: Option<ClassId>,
    pub is_meta_class: bool,
    pub is_foreign: bool,
    pub field_count: u32,
    pub methods: FxHashMap<SignatureId, MethodEntry>,
    pub foreign_allocate: Option<u32>,
    pub foreign_finalize: Option<u32>,
}

impl ObjClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: ObjHeader::new(Value::NULL, GcColor::White0),
            name: name.into(),
            parent: None,
            metaclass: None,
            is_meta_class: false,
            is_foreign: false,
            field_count: 0,
            methods: FxHashMap::default(),
            foreign_allocate: None,
            foreign_finalize: None,
        }
    }

    pub fn add_method(&mut self, id: SignatureId, entry: MethodEntry) {
        self.methods.insert(id, entry);
    }
}

/// Errors raised by dispatch. Per spec §7 these are runtime type errors: the
/// runtime prints a descriptive message and aborts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{receiver_class} does not implement {signature}")]
    MethodNotFound { receiver_class: String, signature: SignatureId },
    #[error("class {0:?} has no parent to search from")]
    NoParentClass(ClassId),
    #[error("unknown class id {0:?}")]
    UnknownClass(ClassId),
}

/// Owns every `ObjClass` for process lifetime plus the three built-in class
/// ids dispatch needs before any user class descriptor has been processed.
///
/// Spec §9: "Global mutable state ... should wrap each in a once-initialized
/// lazy singleton and expose operations, not the state itself" — callers get
/// a `ClassRegistry` handle and only ever call its methods.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<ObjClass>,
    by_name: FxHashMap<String, ClassId>,
    num_class: Option<ClassId>,
    null_class: Option<ClassId>,
    object_class: Option<ClassId>,
    class_class: Option<ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ObjClass) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.by_name.insert(class.name.clone(), id);
        self.classes.push(class);
        id
    }

    pub fn get(&self, id: ClassId) -> Result<&ObjClass, DispatchError> {
        self.classes.get(id.0 as usize).ok_or(DispatchError::UnknownClass(id))
    }

    pub fn get_mut(&mut self, id: ClassId) -> Result<&mut ObjClass, DispatchError> {
        self.classes.get_mut(id.0 as usize).ok_or(DispatchError::UnknownClass(id))
    }

    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn set_num_class(&mut self, id: ClassId) {
        self.num_class = Some(id);
    }
    pub fn set_null_class(&mut self, id: ClassId) {
        self.null_class = Some(id);
    }
    pub fn set_object_class(&mut self, id: ClassId) {
        self.object_class = Some(id);
    }
    pub fn set_class_class(&mut self, id: ClassId) {
        self.class_class = Some(id);
    }

    /// `get_core_class_value` (4.J): the class used as a system variable for
    /// a given built-in name.
    pub fn core_class(&self, name: &str) -> Option<ClassId> {
        match name {
            "Num" => self.num_class,
            "Null" => self.null_class,
            "Object" => self.object_class,
            "Class" => self.class_class,
            _ => self.by_name(name),
        }
    }

    /// Byte offset from an object's base to its first field slot, accounting
    /// for inherited fields. Fields are laid out parent-first.
    pub fn field_offset(&self, class: ClassId) -> Result<u32, DispatchError> {
        let c = self.get(class)?;
        let inherited = match c.parent {
            Some(p) => self.total_field_count(p)?,
            None => 0,
        };
        Ok(inherited)
    }

    fn total_field_count(&self, class: ClassId) -> Result<u32, DispatchError> {
        let c = self.get(class)?;
        let own = c.field_count;
        match c.parent {
            Some(p) => Ok(own + self.total_field_count(p)?),
            None => Ok(own),
        }
    }

    /// Which class a `Value` belongs to: numbers and null map to their
    /// shared built-in classes, object pointers use their `ObjHeader.class`.
    pub fn class_of(&self, value: Value) -> Option<ClassId> {
        if value.is_number() {
            self.num_class
        } else if value.is_null() {
            self.null_class
        } else {
            // The header's class field stores a Value pointing at the class;
            // in this registry-indexed model that Value encodes a ClassId
            // directly (see `class_id_to_value`/`value_to_class_id`).
            value_to_class_id(value)
        }
    }

    /// `virtual_method_lookup` (4.I/4.J): walk the receiver's class and its
    /// parent chain until a method matching `signature` is found.
    pub fn virtual_method_lookup(&self, receiver: Value, signature: SignatureId) -> Result<MethodEntry, DispatchError> {
        let class = self.class_of(receiver).ok_or(DispatchError::MethodNotFound {
            receiver_class: "<unknown>".into(),
            signature,
        })?;
        self.lookup_from(class, signature).ok_or_else(|| DispatchError::MethodNotFound {
            receiver_class: self.get(class).map(|c| c.name.clone()).unwrap_or_default(),
            signature,
        })
    }

    /// `super_method_lookup` (4.J): start from `declaring_class.parentClass`
    /// (or its metaclass chain for static calls).
    pub fn super_method_lookup(
        &self,
        declaring_class: ClassId,
        signature: SignatureId,
        is_static: bool,
    ) -> Result<MethodEntry, DispatchError> {
        let start_class = if is_static {
            let declaring = self.get(declaring_class)?;
            declaring.metaclass.ok_or(DispatchError::NoParentClass(declaring_class))?
        } else {
            declaring_class
        };
        let declaring = self.get(start_class)?;
        let parent = declaring.parent.ok_or(DispatchError::NoParentClass(start_class))?;
        self.lookup_from(parent, signature).ok_or_else(|| DispatchError::MethodNotFound {
            receiver_class: self.get(parent).map(|c| c.name.clone()).unwrap_or_default(),
            signature,
        })
    }

    fn lookup_from(&self, mut class: ClassId, signature: SignatureId) -> Option<MethodEntry> {
        loop {
            let c = self.classes.get(class.0 as usize)?;
            if let Some(entry) = c.methods.get(&signature) {
                return Some(*entry);
            }
            class = c.parent?;
        }
    }
}

/// Encodes a `ClassId` as a `Value` pointer-shaped bit pattern so it can be
/// stored in `ObjHeader.class` without a real heap pointer backing it.
/// Classes are registry-indexed rather than slab-allocated (see module docs
/// in `gc`), so this is a deliberate reuse of the pointer tag bit space for
/// a small integer index instead of an address.
pub fn class_id_to_value(id: ClassId) -> Value {
    let ptr = (id.0 as u64) as *const ObjHeader;
    unsafe { Value::from_ptr(ptr) }.expect("class indices fit comfortably under the pointer tag mask")
}

fn value_to_class_id(value: Value) -> Option<ClassId> {
    value.as_ptr().map(|ptr| ClassId(ptr as u64 as u32))
}

/// Byte size of [`ObjHeader`]; every managed object's field array starts
/// immediately after this many bytes, matching the slab allocator's
/// single contiguous allocation per object (component K).
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjHeader>();

/// A view over a managed instance's trailing field array (`ObjManaged`,
/// spec §3): a raw pointer plus the field count, read from the object's
/// owning class. The fields live in the same slab allocation as the
/// header, not in a separate Rust allocation.
#[derive(Debug, Clone, Copy)]
pub struct ManagedView {
    header: *mut ObjHeader,
    field_count: usize,
}

impl ManagedView {
    /// # Safety
    /// `header` must point to a live object allocated with at least
    /// `HEADER_SIZE + field_count * size_of::<Value>()` bytes.
    pub unsafe fn new(header: *mut ObjHeader, field_count: usize) -> Self {
        Self { header, field_count }
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// The raw header pointer backing this view, for encoding as a `Value`
    /// once the object is ready to be published (`Value::from_ptr`).
    pub fn as_header_ptr(&self) -> *mut ObjHeader {
        self.header
    }

    unsafe fn fields_ptr(&self) -> *mut Value {
        (self.header as *mut u8).add(HEADER_SIZE) as *mut Value
    }

    pub fn get_field(&self, index: usize) -> Option<Value> {
        if index >= self.field_count {
            return None;
        }
        unsafe { Some(*self.fields_ptr().add(index)) }
    }

    pub fn set_field(&self, index: usize, value: Value) -> bool {
        if index >= self.field_count {
            return false;
        }
        unsafe {
            *self.fields_ptr().add(index) = value;
        }
        true
    }

    /// All field `Value`s, for the GC tracer to walk (4.L).
    pub fn fields(&self) -> &[Value] {
        unsafe { std::slice::from_raw_parts(self.fields_ptr(), self.field_count) }
    }
}

/// Total allocation size, in bytes, for a managed instance with `field_count`
/// trailing `Value` slots.
pub fn managed_alloc_size(field_count: usize) -> usize {
    HEADER_SIZE + field_count * std::mem::size_of::<Value>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrenc_bytecode::signature::{Signature, SignatureKind};

    fn sig(name: &str, arity: u8) -> SignatureId {
        Signature::new(name, SignatureKind::Method, arity).id()
    }

    #[test]
    fn managed_object_field_access() {
        let size = managed_alloc_size(2);
        let mut backing = vec![0u8; size];
        let header = backing.as_mut_ptr() as *mut ObjHeader;
        unsafe { std::ptr::write(header, ObjHeader::new(Value::NULL, GcColor::White0)) };
        let view = unsafe { ManagedView::new(header, 2) };

        assert!(view.set_field(0, Value::number(42.0).unwrap()));
        assert_eq!(view.get_field(0).unwrap().as_number(), Some(42.0));
        assert!(!view.set_field(5, Value::NULL));
        assert_eq!(view.fields().len(), 2);
    }

    #[test]
    fn virtual_dispatch_walks_parent_chain() {
        let mut reg = ClassRegistry::new();
        let a = reg.register(ObjClass::new("A"));
        let foo = sig("foo", 0);
        reg.get_mut(a).unwrap().add_method(foo, MethodEntry { kind: MethodKind::Native, function_id: 1 });

        let mut b = ObjClass::new("B");
        b.parent = Some(a);
        let b = reg.register(b);

        let receiver = class_id_to_value(b);
        let entry = reg.virtual_method_lookup(receiver, foo).unwrap();
        assert_eq!(entry.function_id, 1);
    }

    #[test]
    fn missing_method_errors_with_class_name() {
        let mut reg = ClassRegistry::new();
        let a = reg.register(ObjClass::new("A"));
        let missing = sig("bar", 0);
        let err = reg.virtual_method_lookup(class_id_to_value(a), missing).unwrap_err();
        assert_eq!(err, DispatchError::MethodNotFound { receiver_class: "A".into(), signature: missing });
    }

    #[test]
    fn super_dispatch_resolves_declaring_classs_parent() {
        // class A { foo() } ; class B extends A { foo() { ... } } ; class C extends B { foo() { super.foo() } }
        let mut reg = ClassRegistry::new();
        let foo = sig("foo", 0);

        let a = reg.register(ObjClass::new("A"));
        reg.get_mut(a).unwrap().add_method(foo, MethodEntry { kind: MethodKind::Native, function_id: 10 });

        let mut b_def = ObjClass::new("B");
        b_def.parent = Some(a);
        let b = reg.register(b_def);
        reg.get_mut(b).unwrap().add_method(foo, MethodEntry { kind: MethodKind::Native, function_id: 20 });

        let mut c_def = ObjClass::new("C");
        c_def.parent = Some(b);
        reg.register(c_def);

        // super.foo() called from inside C's foo, declared on B: start from B's parent.
        let entry = reg.super_method_lookup(b, foo, false).unwrap();
        assert_eq!(entry.function_id, 10);
    }

    #[test]
    fn field_offset_accounts_for_inheritance() {
        let mut reg = ClassRegistry::new();
        let mut a = ObjClass::new("A");
        a.field_count = 2;
        let a = reg.register(a);
        let mut b = ObjClass::new("B");
        b.field_count = 3;
        b.parent = Some(a);
        let b = reg.register(b);
        assert_eq!(reg.field_offset(b).unwrap(), 2);
        assert_eq!(reg.field_offset(a).unwrap(), 0);
    }
}
