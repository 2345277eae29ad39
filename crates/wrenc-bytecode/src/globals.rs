//! Globals table (spec §6): a null-terminated array of `{ name, target }`
//! pairs exposed by every module through a single `<module-name>_get_globals`
//! entry point, plus reserved keys consumed by the loader.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Key of the reserved entry carrying the module's initializer function.
pub const INIT_FUNC_KEY: &str = "<INTERNAL>::init_func";
/// Key of the reserved entry carrying the module's own name.
pub const MODULE_NAME_KEY: &str = "<INTERNAL>::module_name";
/// Key of the reserved, optional entry carrying the module's stackmap blob.
pub const STACK_MAP_KEY: &str = "<INTERNAL>::stack_map";

/// A resolved (name, target-offset) pair. `target` is a relocation-bearing
/// offset resolved by the linker; this crate only deals in the serialized
/// table shape, not the link step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub name: String,
    pub target: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalsTable {
    pub entries: Vec<GlobalEntry>,
}

impl GlobalsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, target: u64) {
        self.entries.push(GlobalEntry { name: name.into(), target });
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.target)
    }

    pub fn init_func(&self) -> Option<u64> {
        self.get(INIT_FUNC_KEY)
    }

    pub fn module_name(&self) -> Option<&str> {
        self.entries.iter().find(|e| e.name == MODULE_NAME_KEY).map(|e| e.name.as_str())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BytecodeWriter::new();
        w.emit_u32(self.entries.len() as u32);
        for e in &self.entries {
            w.emit_string(&e.name);
            w.emit_u64(e.target);
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BytecodeReader::new(bytes);
        let count = r.read_u32()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = r.read_string()?;
            let target = r.read_u64()?;
            entries.push(GlobalEntry { name, target });
        }
        Ok(GlobalsTable { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut t = GlobalsTable::new();
        t.insert("main", 0x1000);
        t.insert(INIT_FUNC_KEY, 0x2000);
        t.insert(MODULE_NAME_KEY, 0);
        let bytes = t.encode();
        let decoded = GlobalsTable::decode(&bytes).unwrap();
        assert_eq!(decoded.get("main"), Some(0x1000));
        assert_eq!(decoded.init_func(), Some(0x2000));
    }

    #[test]
    fn missing_key_is_none() {
        let t = GlobalsTable::new();
        assert_eq!(t.get("nope"), None);
    }
}
