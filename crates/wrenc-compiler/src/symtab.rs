//! Symbol / scope stack (spec component D): lexical scopes, locals,
//! upvalues, fields and signatures, as seen by the parser while it builds
//! the IR tree. This is consumed during parsing only — once the IR exists
//! downstream passes (E-I) walk it directly and never consult a symbol
//! table again.

use rustc_hash::FxHashMap;
use wrenc_bytecode::signature::{Signature, SignatureId};

use crate::error::{CompileError, Diagnostics};
use crate::ir::{FieldId, LocalId, UpvalueId};

/// One block-scoped binding. Scopes nest in a stack; a name resolves to
/// the innermost scope's binding that declares it.
#[derive(Debug, Clone, Copy)]
enum Binding {
    Local(LocalId),
    Upvalue(UpvalueId),
}

#[derive(Debug, Default)]
struct Block {
    bindings: FxHashMap<String, Binding>,
}

/// One function's nested block scopes plus its local/upvalue counters.
/// Functions themselves nest in a [`ScopeStack`] (outermost first) so that
/// resolving a name against an enclosing function can synthesize an
/// upvalue chain without any self-referential borrowing between frames.
#[derive(Debug, Default)]
struct FunctionFrame {
    blocks: Vec<Block>,
    next_local: u32,
    next_upvalue: u32,
}

impl FunctionFrame {
    fn new() -> Self {
        Self { blocks: vec![Block::default()], next_local: 0, next_upvalue: 0 }
    }

    fn resolve_own(&self, name: &str) -> Option<Binding> {
        self.blocks.iter().rev().find_map(|b| b.bindings.get(name).copied())
    }
}

/// What resolving a name against the enclosing function chain produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local(LocalId),
    Upvalue(UpvalueId),
}

/// A stack of function frames, outermost enclosing function first and the
/// function currently being parsed last. Pushing/popping mirrors entering
/// and leaving a nested closure literal.
#[derive(Debug, Default)]
pub struct ScopeStack {
    functions: Vec<FunctionFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { functions: Vec::new() }
    }

    pub fn push_function(&mut self) {
        self.functions.push(FunctionFrame::new());
    }

    pub fn pop_function(&mut self) {
        self.functions.pop();
    }

    pub fn push_block(&mut self) {
        self.current_mut().blocks.push(Block::default());
    }

    pub fn pop_block(&mut self) {
        self.current_mut().blocks.pop();
    }

    fn current_mut(&mut self) -> &mut FunctionFrame {
        self.functions.last_mut().expect("a function scope must be pushed before use")
    }

    /// Declares a new local in the innermost block of the current
    /// function. Reports `RedeclaredVariable` if the name already has a
    /// binding in that same block (spec §7); shadowing an outer block or
    /// an enclosing function is fine.
    pub fn declare_local(&mut self, name: &str, diagnostics: &mut Diagnostics) -> LocalId {
        let frame = self.current_mut();
        let next_local = frame.next_local;
        let block = frame.blocks.last_mut().expect("at least one block is always open");
        if block.bindings.contains_key(name) {
            diagnostics.report(CompileError::RedeclaredVariable(name.to_string()));
        }
        let id = LocalId::new(next_local);
        frame.next_local += 1;
        block.bindings.insert(name.to_string(), Binding::Local(id));
        id
    }

    /// Resolves a name against the current function's own blocks, then
    /// walks outward through enclosing functions, recording an
    /// `UpvalueVariable` binding in every function frame it had to cross.
    pub fn resolve(&mut self, name: &str) -> Option<Resolution> {
        let depth = self.functions.len();
        if depth == 0 {
            return None;
        }
        if let Some(binding) = self.functions[depth - 1].resolve_own(name) {
            return Some(match binding {
                Binding::Local(id) => Resolution::Local(id),
                Binding::Upvalue(id) => Resolution::Upvalue(id),
            });
        }
        // Not bound in the current function: find the innermost ancestor
        // that does bind it, then thread an upvalue down through every
        // frame in between.
        let mut found_at = None;
        for i in (0..depth - 1).rev() {
            if self.functions[i].resolve_own(name).is_some() {
                found_at = Some(i);
                break;
            }
        }
        let found_at = found_at?;
        let mut last = Resolution::Local(LocalId::new(0)); // overwritten before first use below
        for i in found_at..depth {
            if i == found_at {
                last = match self.functions[i].resolve_own(name).unwrap() {
                    Binding::Local(id) => Resolution::Local(id),
                    Binding::Upvalue(id) => Resolution::Upvalue(id),
                };
                continue;
            }
            let frame = &mut self.functions[i];
            let id = UpvalueId::new(frame.next_upvalue);
            frame.next_upvalue += 1;
            frame.blocks.first_mut().expect("function frame always has a root block").bindings.insert(name.to_string(), Binding::Upvalue(id));
            last = Resolution::Upvalue(id);
        }
        Some(last)
    }
}

/// Tracks a class's declared fields and method signatures while its body
/// is being parsed. Method/field name clashes are reported as
/// `CompileError::DuplicateMethod`, not panicked on.
#[derive(Default)]
pub struct ClassScope {
    fields: FxHashMap<String, FieldId>,
    next_field: u32,
    signatures: FxHashMap<SignatureId, Signature>,
}

impl ClassScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_field(&mut self, name: &str) -> FieldId {
        if let Some(id) = self.fields.get(name) {
            return *id;
        }
        let id = FieldId::new(self.next_field);
        self.next_field += 1;
        self.fields.insert(name.to_string(), id);
        id
    }

    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.fields.get(name).copied()
    }

    /// Registers a method signature, reporting a duplicate-method error if
    /// this class already declared the same signature id.
    pub fn declare_method(&mut self, class_name: &str, sig: Signature, diagnostics: &mut Diagnostics) -> SignatureId {
        let id = sig.id();
        if self.signatures.contains_key(&id) {
            diagnostics.report(CompileError::DuplicateMethod {
                class: class_name.to_string(),
                signature: sig.canonical(),
            });
        } else {
            self.signatures.insert(id, sig);
        }
        id
    }

    pub fn field_count(&self) -> u32 {
        self.next_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrenc_bytecode::signature::SignatureKind;

    #[test]
    fn sibling_blocks_do_not_see_each_others_locals() {
        let mut s = ScopeStack::new();
        s.push_function();
        s.push_block();
        let mut d = Diagnostics::new("m");
        s.declare_local("x", &mut d);
        s.pop_block();
        s.push_block();
        assert!(s.resolve("x").is_none());
    }

    #[test]
    fn redeclaring_in_same_block_is_reported() {
        let mut s = ScopeStack::new();
        s.push_function();
        let mut d = Diagnostics::new("m");
        s.declare_local("x", &mut d);
        s.declare_local("x", &mut d);
        assert!(!d.ok());
    }

    #[test]
    fn shadowing_a_different_block_is_fine() {
        let mut s = ScopeStack::new();
        s.push_function();
        let mut d = Diagnostics::new("m");
        s.declare_local("x", &mut d);
        s.push_block();
        s.declare_local("x", &mut d);
        assert!(d.ok());
    }

    #[test]
    fn nested_closure_resolves_enclosing_local_as_upvalue() {
        let mut s = ScopeStack::new();
        s.push_function();
        let mut d = Diagnostics::new("m");
        s.declare_local("x", &mut d);
        s.push_function();
        let resolution = s.resolve("x");
        assert!(matches!(resolution, Some(Resolution::Upvalue(_))));
    }

    #[test]
    fn doubly_nested_closure_chains_upvalues_through_middle_frame() {
        let mut s = ScopeStack::new();
        s.push_function();
        let mut d = Diagnostics::new("m");
        s.declare_local("x", &mut d);
        s.push_function();
        s.push_function();
        assert!(matches!(s.resolve("x"), Some(Resolution::Upvalue(_))));
        // The middle frame should now also have `x` bound as an upvalue.
        s.pop_function();
        assert!(matches!(s.resolve("x"), Some(Resolution::Upvalue(_))));
    }

    #[test]
    fn class_scope_assigns_stable_field_ids() {
        let mut c = ClassScope::new();
        let a = c.declare_field("count");
        let b = c.declare_field("count");
        assert_eq!(a, b);
        assert_eq!(c.field_count(), 1);
    }

    #[test]
    fn duplicate_method_signature_is_reported() {
        let mut c = ClassScope::new();
        let mut d = Diagnostics::new("m");
        let sig = Signature::new("foo", SignatureKind::Method, 1);
        c.declare_method("Foo", sig.clone(), &mut d);
        c.declare_method("Foo", sig, &mut d);
        assert!(!d.ok());
    }
}
