//! Expression nodes (spec §3).

use serde::{Deserialize, Serialize};
use wrenc_bytecode::signature::SignatureId;

use super::ids::{BeginUpvaluesId, ClassId, FieldId, FunctionId, LabelId};
use super::stmt::Stmt;
use super::value::CcValue;
use super::vars::VarDecl;

/// A reference to a field, with the optional `this` override `super`-call
/// sites use to read a field through an explicit receiver rather than the
/// implicit current receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLoad {
    pub field: FieldId,
    pub this_override: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// A compile-time literal.
    Const(CcValue),
    /// Reads the current value of a variable.
    Load(VarDecl),
    /// Reads an instance field, optionally through an explicit receiver.
    FieldLoad(FieldLoad),
    /// A method call: `receiver.signature(args)`, or `super.signature(args)`
    /// when `is_super` is set (dispatch starts at the declaring class's
    /// parent rather than the receiver's own class, per 4.J).
    FuncCall { receiver: Box<Expr>, signature: SignatureId, args: Vec<Expr>, is_super: bool },
    /// Builds a closure value over the named function, capturing whatever
    /// upvalues that function's `upvalues` map declares.
    Closure(FunctionId),
    /// The implicit receiver of the enclosing method (`this`).
    LoadReceiver,
    /// Executes `stmt` then yields the value of `result`. Always lowered
    /// away by the cleanup pass (4.E rule 4); never reaches basic-block
    /// construction.
    RunStatements { stmt: Box<Stmt>, result: VarDecl },
    /// Allocates (but does not initialize) storage for a new instance of
    /// `class`.
    AllocateInstanceMemory(ClassId),
    /// A name resolved against the module's system/core bindings rather
    /// than a user-declared variable (e.g. `System`, `Object`).
    SystemVar(String),
    /// The class value of an IR class, used for static dispatch and
    /// `super` resolution.
    GetClassVar(ClassId),
    /// An SSA phi: the value is whichever predecessor branch was taken.
    /// `inputs` lists one `SsaId`-bearing `VarDecl::Ssa` load per
    /// predecessor, in the owning block's `ssaInputs` order.
    Phi(Vec<VarDecl>),
}

impl Expr {
    /// True for `FuncCall` — the shape cleanup's call-site-ordering rule
    /// (4.E rule 5) hoists when not already a direct child of `Assign` or
    /// `EvalAndIgnore`.
    pub fn is_call(&self) -> bool {
        matches!(self, Expr::FuncCall { .. })
    }
}

/// A reference to `{label}` used by `Jump` and the basic-block pass; kept
/// here rather than in `stmt.rs` since both `Expr` (none currently) and
/// `Stmt` reference label identity.
pub type Label = LabelId;
pub type BeginUpvalues = BeginUpvaluesId;
