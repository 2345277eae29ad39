//! Arena-index newtypes threaded through the IR (spec §3: "tagged variants,
//! allocated from a per-module arena"). Kept distinct per node kind so a
//! `FunctionId` can never be mistaken for a `ClassId` at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(id: u32) -> Self {
                Self(id)
            }

            pub fn as_u32(&self) -> u32 {
                self.0
            }

            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

arena_id!(FunctionId, "fn");
arena_id!(ClassId, "class");
arena_id!(LabelId, "L");
arena_id!(BasicBlockId, "bb");
arena_id!(LocalId, "local");
arena_id!(UpvalueId, "up");
arena_id!(SsaId, "ssa");
arena_id!(FieldId, "field");
arena_id!(GlobalId, "global");
arena_id!(BeginUpvaluesId, "bu");
