//! Variable kinds (spec §3): `LocalVariable`, `UpvalueVariable`,
//! `SSAVariable`, `IRGlobalDecl`, `FieldVariable`.

use serde::{Deserialize, Serialize};

use super::ids::{FieldId, GlobalId, LocalId, SsaId, UpvalueId};

/// A concrete runtime type as inferred by the type-inference pass (4.H).
/// `Unknown` is always a safe over-approximation; absence of an assignment
/// resolves to it rather than panicking the pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InferredType {
    #[default]
    Unknown,
    Null,
    Num,
    Object,
    /// A known native class, e.g. `ObjString`, `ObjBool`, `ObjRange`.
    ObjectSystem(&'static str),
}

/// A mutable, block-scoped local. May be captured by a closure, in which
/// case it is also referenced by an `UpvalueVariable` in the capturing
/// function and is excluded from SSA renaming (4.G: "variables opted out of
/// SSA... those captured by an upvalue").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVariable {
    pub id: LocalId,
    pub name: String,
    pub captured: bool,
    /// Import targets (module-scope bindings) disable SSA outright (4.G).
    pub disable_ssa: bool,
}

impl LocalVariable {
    pub fn new(id: LocalId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), captured: false, disable_ssa: false }
    }
}

/// Captures either a parent scope's local or another function's upvalue,
/// one level removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpvalueSource {
    ParentLocal(LocalId),
    ParentUpvalue(UpvalueId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpvalueVariable {
    pub id: UpvalueId,
    pub name: String,
    pub source: UpvalueSource,
}

/// A single-assignment value produced by the SSA pass (4.G). `local` names
/// the source local this SSA variable replaces a definition of, for
/// diagnostics and for the type-inference pass's dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaVariable {
    pub id: SsaId,
    pub local: LocalId,
    pub ty: InferredType,
}

/// A module-scope global declaration (e.g. a top-level `var`, or an import
/// binding — import targets always carry `disable_ssa` on the backing
/// local).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub id: GlobalId,
    pub name: String,
}

/// A class-scope instance field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldVariable {
    pub id: FieldId,
    pub name: String,
    /// Offset within the object's field array, assigned once the owning
    /// class's full inheritance chain is known.
    pub offset: Option<u32>,
}

/// The four variable kinds an `Expr::Load` / `Stmt::Assign` target can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarDecl {
    Local(LocalId),
    Upvalue(UpvalueId),
    Ssa(SsaId),
    Global(GlobalId),
}
