//! Stackmap wire format (spec 4.I / §6): a module-private section mapping
//! call-site instruction pointers to the stack slots holding live `Value`s,
//! consumed by the GC's stack walker (4.L).

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

const MAJOR: u16 = 1;
const MINOR: u16 = 0;

const RECORD_FUNCTION: u16 = 1;
const RECORD_STATEPOINT: u16 = 2;
const RECORD_OBJECT_NAME: u16 = 3;
const RECORD_END_OF_STACK_MAP: u16 = 0xffff;

/// One call site's live-slot set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statepoint {
    /// Byte offset of the return address from the start of the function.
    pub instruction_offset: u32,
    /// Stack-slot indices (byte-offset / 8) holding live `Value`s at this call.
    pub live_slots: Vec<u16>,
}

/// Per-function stackmap entry: identity plus its statepoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStackMap {
    pub name: String,
    pub stack_size: u32,
    pub statepoints: Vec<Statepoint>,
}

/// A whole module's stackmap section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMap {
    pub functions: Vec<FunctionStackMap>,
}

impl StackMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: impl Into<String>, stack_size: u32) -> &mut FunctionStackMap {
        self.functions.push(FunctionStackMap { name: name.into(), stack_size, statepoints: Vec::new() });
        self.functions.last_mut().unwrap()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BytecodeWriter::new();
        w.emit_u16(MAJOR);
        w.emit_u16(MINOR);
        w.emit_u16(0); // flags
        w.emit_u16(0); // reserved

        for f in &self.functions {
            let payload_start = w.offset();
            w.emit_u16(RECORD_FUNCTION);
            let size_at = w.offset();
            w.emit_u16(0); // payload size, patched below
            w.emit_u16(0); // flags
            w.emit_u16(0); // forObject
            w.emit_u32(0); // function-pointer-reloc (resolved by the linker)
            w.emit_u32(f.statepoints.len() as u32);
            w.emit_u32(f.stack_size);
            let payload_size = (w.offset() - payload_start - 8) as u16;
            w.patch_u32(size_at, payload_size as u32);

            w.emit_u16(RECORD_OBJECT_NAME);
            let size_at = w.offset();
            w.emit_u16(0);
            w.emit_u16(0);
            w.emit_u16(0);
            let name_start = w.offset();
            w.emit_string(&f.name);
            let payload_size = (w.offset() - name_start) as u16;
            w.patch_u32(size_at, payload_size as u32);

            for sp in &f.statepoints {
                w.emit_u16(RECORD_STATEPOINT);
                let size_at = w.offset();
                w.emit_u16(0);
                w.emit_u16(0);
                w.emit_u16(0);
                let body_start = w.offset();
                w.emit_u32(sp.instruction_offset);
                w.emit_u32(sp.live_slots.len() as u32);
                for &slot in &sp.live_slots {
                    w.emit_u16(slot);
                }
                let payload_size = (w.offset() - body_start) as u16;
                w.patch_u32(size_at, payload_size as u32);
            }
        }

        w.emit_u16(RECORD_END_OF_STACK_MAP);
        w.emit_u16(0);
        w.emit_u16(0);
        w.emit_u16(0);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BytecodeReader::new(bytes);
        let _major = r.read_u16()?;
        let _minor = r.read_u16()?;
        let _flags = r.read_u16()?;
        let _reserved = r.read_u16()?;

        let mut functions = Vec::new();
        let mut current: Option<FunctionStackMap> = None;
        let mut pending_statepoint_count = 0u32;

        loop {
            let id = r.read_u16()?;
            let payload_size = r.read_u16()? as usize;
            let _rec_flags = r.read_u16()?;
            let _for_object = r.read_u16()?;

            match id {
                RECORD_END_OF_STACK_MAP => {
                    if let Some(f) = current.take() {
                        functions.push(f);
                    }
                    break;
                }
                RECORD_FUNCTION => {
                    if let Some(f) = current.take() {
                        functions.push(f);
                    }
                    let _reloc = r.read_u32()?;
                    let count = r.read_u32()?;
                    let stack_size = r.read_u32()?;
                    pending_statepoint_count = count;
                    current = Some(FunctionStackMap {
                        name: String::new(),
                        stack_size,
                        statepoints: Vec::with_capacity(count as usize),
                    });
                }
                RECORD_OBJECT_NAME => {
                    let name = r.read_string()?;
                    if let Some(f) = current.as_mut() {
                        f.name = name;
                    }
                }
                RECORD_STATEPOINT => {
                    let instruction_offset = r.read_u32()?;
                    let n = r.read_u32()?;
                    let mut live_slots = Vec::with_capacity(n as usize);
                    for _ in 0..n {
                        live_slots.push(r.read_u16()?);
                    }
                    if let Some(f) = current.as_mut() {
                        f.statepoints.push(Statepoint { instruction_offset, live_slots });
                    }
                    let _ = pending_statepoint_count;
                }
                other => return Err(DecodeError::InvalidTag(other as u32)),
            }
            let _ = payload_size;
        }

        Ok(StackMap { functions })
    }

    /// Finds the statepoint exactly matching an instruction offset within a
    /// named function, as the GC stack walker does per call site (4.L).
    pub fn lookup(&self, function_name: &str, instruction_offset: u32) -> Option<&Statepoint> {
        self.functions
            .iter()
            .find(|f| f.name == function_name)?
            .statepoints
            .iter()
            .find(|sp| sp.instruction_offset == instruction_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_empty() {
        let map = StackMap::new();
        let bytes = map.encode();
        let decoded = StackMap::decode(&bytes).unwrap();
        assert_eq!(decoded.functions.len(), 0);
    }

    #[test]
    fn roundtrip_with_statepoints() {
        let mut map = StackMap::new();
        {
            let f = map.add_function("main", 64);
            f.statepoints.push(Statepoint { instruction_offset: 16, live_slots: vec![0, 2, 5] });
            f.statepoints.push(Statepoint { instruction_offset: 40, live_slots: vec![] });
        }
        let bytes = map.encode();
        let decoded = StackMap::decode(&bytes).unwrap();
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.functions[0].name, "main");
        assert_eq!(decoded.functions[0].statepoints.len(), 2);
        assert_eq!(decoded.functions[0].statepoints[0].live_slots, vec![0, 2, 5]);
    }

    #[test]
    fn lookup_finds_exact_offset() {
        let mut map = StackMap::new();
        map.add_function("f", 32).statepoints.push(Statepoint { instruction_offset: 8, live_slots: vec![1] });
        let sp = map.lookup("f", 8).unwrap();
        assert_eq!(sp.live_slots, vec![1]);
        assert!(map.lookup("f", 9).is_none());
        assert!(map.lookup("missing", 8).is_none());
    }
}
