//! Literal constants carried by `Expr::Const` (spec §3).
//!
//! Mirrors the teacher's notion of a tagged constant value but over the
//! value space this language actually has, grounded on
//! `examples/original_source/src/CcValue.h`'s `{UNDEFINED, NULL_TYPE,
//! STRING, BOOL, INT, NUM}` tagging.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A compile-time constant, as embedded directly in the IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CcValue {
    Null,
    Bool(bool),
    /// Integer literals are kept distinct from `Num` until type inference
    /// decides whether the backend can use an unboxed int fast path; both
    /// ultimately box down to the same `num` runtime type.
    Int(i64),
    Num(f64),
    Str(String),
}

impl CcValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            CcValue::Null => "null",
            CcValue::Bool(_) => "bool",
            CcValue::Int(_) | CcValue::Num(_) => "num",
            CcValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for CcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CcValue::Null => write!(f, "null"),
            CcValue::Bool(b) => write!(f, "{b}"),
            CcValue::Int(i) => write!(f, "{i}"),
            CcValue::Num(n) => write!(f, "{n}"),
            CcValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}
