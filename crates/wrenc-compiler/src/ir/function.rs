//! `IRFn`: a function's parameters, locals, body and upvalue map (spec §3).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::ids::{ClassId, FunctionId, LocalId, SsaId, UpvalueId};
use super::stmt::Stmt;
use super::vars::{LocalVariable, SsaVariable, UpvalueVariable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFn {
    pub id: FunctionId,
    pub debug_name: String,
    /// Ordered `LocalVariable`s bound to incoming arguments; `params.len()`
    /// is the function's arity (plus an implicit receiver slot when
    /// `enclosing_class` is set, per the backend contract 4.I).
    pub params: Vec<LocalId>,
    pub locals: Vec<LocalVariable>,
    pub upvalues: FxHashMap<UpvalueId, UpvalueVariable>,
    /// Populated by the SSA pass (4.G); empty before it runs.
    pub ssa_vars: Vec<SsaVariable>,
    pub body: Stmt,
    pub enclosing_class: Option<ClassId>,
    /// Root `BeginUpvalues` node id for the function's top scope, if any
    /// local in the function is captured by a nested closure.
    pub root_begin_upvalues: Option<super::ids::BeginUpvaluesId>,
}

impl IrFn {
    pub fn local(&self, id: LocalId) -> Option<&LocalVariable> {
        self.locals.iter().find(|l| l.id == id)
    }

    pub fn local_mut(&mut self, id: LocalId) -> Option<&mut LocalVariable> {
        self.locals.iter_mut().find(|l| l.id == id)
    }

    pub fn ssa_var(&self, id: SsaId) -> Option<&SsaVariable> {
        self.ssa_vars.iter().find(|v| v.id == id)
    }

    pub fn is_method(&self) -> bool {
        self.enclosing_class.is_some()
    }
}
