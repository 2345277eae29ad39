//! `ClassInfo`: a class's fields, method tables and parent expression
//! (spec §3).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use wrenc_bytecode::signature::SignatureId;

use super::expr::Expr;
use super::ids::{ClassId, FieldId, FunctionId};
use super::vars::FieldVariable;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassAttribute {
    pub group: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub fields: Vec<FieldVariable>,
    pub methods: FxHashMap<SignatureId, FunctionId>,
    pub static_methods: FxHashMap<SignatureId, FunctionId>,
    /// Canonical signature backing every id in `methods`/`static_methods`,
    /// kept alongside since a `SignatureId` is a one-way hash and the
    /// backend needs the name/kind/arity back to emit a class descriptor
    /// (4.I) and populate `virtual_method_lookup` tables (4.J).
    pub signatures: FxHashMap<SignatureId, wrenc_bytecode::signature::Signature>,
    pub is_foreign: bool,
    /// The superclass expression; evaluated once at class-definition time
    /// (`DefineClass`). `None` only for `Object` itself.
    pub parent: Option<Expr>,
    pub attributes: Vec<ClassAttribute>,
}

impl ClassInfo {
    pub fn new(id: ClassId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            fields: Vec::new(),
            methods: FxHashMap::default(),
            static_methods: FxHashMap::default(),
            signatures: FxHashMap::default(),
            is_foreign: false,
            parent: None,
            attributes: Vec::new(),
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldVariable> {
        self.fields.iter().find(|f| f.id == id)
    }
}
