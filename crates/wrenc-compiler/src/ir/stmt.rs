//! Statement nodes (spec §3).

use serde::{Deserialize, Serialize};

use super::expr::Expr;
use super::ids::{BasicBlockId, BeginUpvaluesId, ClassId, LabelId, LocalId};
use super::vars::VarDecl;

/// One `{source name -> local}` binding imported by a `LoadModule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBinding {
    pub source_name: String,
    pub target: LocalId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// A sequence of statements. After the cleanup pass (4.E rule 1) no
    /// `Block` directly contains another `Block`; after the basic-block
    /// pass (4.F) every function body's direct children are blocks marked
    /// `is_basic_block`.
    Block { stmts: Vec<Stmt>, is_basic_block: bool, owner: Option<BasicBlockId> },
    Assign(VarDecl, Expr),
    FieldAssign { field: super::ids::FieldId, this_override: Option<Expr>, value: Expr },
    /// Evaluates `Expr` for its side effect, discarding the result.
    EvalAndIgnore(Expr),
    Return(Expr),
    /// `condition = None` is an unconditional jump. `jump_on_false` flips
    /// the polarity of a conditional jump; `looping` marks a back-edge so
    /// the basic-block and SSA passes can recognize loop headers.
    Jump { target: LabelId, condition: Option<Expr>, jump_on_false: bool, looping: bool },
    /// `parent` is a back-pointer to the enclosing `Block`, set once that
    /// block is known (after parsing, before cleanup).
    Label { id: LabelId, debug_name: Option<String>, parent: Option<BasicBlockId> },
    LoadModule { name: String, bindings: Vec<ImportBinding> },
    DefineClass { class: ClassId, output: VarDecl },
    /// Declares which locals this scope may hand out upvalue storage for;
    /// emptied and removed if none ever do (4.E rule 6).
    BeginUpvalues { id: BeginUpvaluesId, locals: Vec<LocalId> },
    /// Decrements the refcount of every storage block owned by the named
    /// `BeginUpvalues` nodes once their scope provably can't be re-entered.
    RelocateUpvalues(Vec<BeginUpvaluesId>),
}

impl Stmt {
    pub fn is_unconditional_terminator(&self) -> bool {
        matches!(self, Stmt::Return(_)) || matches!(self, Stmt::Jump { condition: None, .. })
    }

    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Stmt::Label { id, .. } => Some(*id),
            _ => None,
        }
    }
}
