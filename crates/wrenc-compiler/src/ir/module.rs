//! `IrModule`: the top-level arena holding every function and class parsed
//! out of one source module (spec §3: "allocated from a per-module arena").

use serde::{Deserialize, Serialize};

use super::class::ClassInfo;
use super::function::IrFn;
use super::ids::{ClassId, FunctionId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrModule {
    pub name: String,
    pub functions: Vec<IrFn>,
    pub classes: Vec<ClassInfo>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: Vec::new(), classes: Vec::new() }
    }

    pub fn function(&self, id: FunctionId) -> &IrFn {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut IrFn {
        &mut self.functions[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.index()]
    }

    pub fn push_function(&mut self, mut make: impl FnMut(FunctionId) -> IrFn) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        self.functions.push(make(id));
        id
    }

    pub fn push_class(&mut self, mut make: impl FnMut(ClassId) -> ClassInfo) -> ClassId {
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(make(id));
        id
    }
}
