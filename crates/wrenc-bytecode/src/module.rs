//! Compiled module container: the object-module artifact emitted by the
//! backend contract (4.I) and consumed by the loader at runtime. Bundles the
//! class-descriptor streams, the globals table and the optional stackmap
//! section behind a checksummed header, mirroring how module artifacts were
//! framed in the teacher's bytecode crate.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number identifying a wrenc compiled-module artifact.
pub const MAGIC: [u8; 4] = *b"WRNC";

/// Current artifact format version.
pub const VERSION: u32 = 1;

pub mod flags {
    pub const HAS_DEBUG_INFO: u32 = 1 << 0;
    pub const HAS_STACK_MAP: u32 = 1 << 1;
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid magic number: expected {MAGIC:?}, got {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("unsupported artifact version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),
    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// A single class's raw descriptor command stream (see `class_descriptor`).
#[derive(Debug, Clone)]
pub struct ClassSection {
    pub name: String,
    pub descriptor: Vec<u8>,
}

/// Debug metadata carried alongside the artifact when `HAS_DEBUG_INFO` is set.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub module_name: String,
    pub source_file: Option<String>,
}

/// The fully assembled object-module artifact.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub flags: u32,
    pub globals_table: Vec<u8>,
    pub classes: Vec<ClassSection>,
    pub stack_map: Option<Vec<u8>>,
    pub metadata: Metadata,
}

impl CompiledModule {
    pub fn new(metadata: Metadata) -> Self {
        Self { flags: 0, globals_table: Vec::new(), classes: Vec::new(), stack_map: None, metadata }
    }

    /// Encodes the artifact: 16-byte header (magic, version, flags, checksum
    /// placeholder) followed by the payload, then patches the checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = self.flags & !flags::HAS_STACK_MAP;
        if self.stack_map.is_some() {
            flags |= flags::HAS_STACK_MAP;
        }

        let mut w = BytecodeWriter::new();
        w.emit_bytes(&MAGIC);
        w.emit_u32(VERSION);
        w.emit_u32(flags);
        let checksum_at = w.offset();
        w.emit_u32(0);

        let payload_start = w.offset();
        w.emit_string(&self.metadata.module_name);
        w.emit_string(self.metadata.source_file.as_deref().unwrap_or(""));
        w.emit_u32(self.globals_table.len() as u32);
        w.emit_bytes(&self.globals_table);
        w.emit_u32(self.classes.len() as u32);
        for c in &self.classes {
            w.emit_string(&c.name);
            w.emit_u32(c.descriptor.len() as u32);
            w.emit_bytes(&c.descriptor);
        }
        if let Some(sm) = &self.stack_map {
            w.emit_u32(sm.len() as u32);
            w.emit_bytes(sm);
        }

        let payload = &w.as_slice()[payload_start..];
        let checksum = crc32fast::hash(payload);
        w.patch_u32(checksum_at, checksum);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ModuleError> {
        let mut r = BytecodeReader::new(bytes);
        let magic: [u8; 4] = r.read_bytes(4)?.try_into().unwrap();
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }
        let version = r.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }
        let flags_val = r.read_u32()?;
        let expected_checksum = r.read_u32()?;

        let payload = &bytes[r.offset()..];
        let actual_checksum = crc32fast::hash(payload);
        if actual_checksum != expected_checksum {
            return Err(ModuleError::ChecksumMismatch { expected: expected_checksum, actual: actual_checksum });
        }

        let module_name = r.read_string()?;
        let source_file = r.read_string()?;
        let globals_len = r.read_u32()? as usize;
        let globals_table = r.read_bytes(globals_len)?.to_vec();
        let class_count = r.read_u32()?;
        let mut classes = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            let name = r.read_string()?;
            let len = r.read_u32()? as usize;
            let descriptor = r.read_bytes(len)?.to_vec();
            classes.push(ClassSection { name, descriptor });
        }
        let stack_map = if flags_val & flags::HAS_STACK_MAP != 0 {
            let len = r.read_u32()? as usize;
            Some(r.read_bytes(len)?.to_vec())
        } else {
            None
        };

        Ok(CompiledModule {
            flags: flags_val,
            globals_table,
            classes,
            stack_map,
            metadata: Metadata {
                module_name,
                source_file: if source_file.is_empty() { None } else { Some(source_file) },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompiledModule {
        let mut m = CompiledModule::new(Metadata { module_name: "main".into(), source_file: Some("main.wren".into()) });
        m.globals_table = vec![1, 2, 3, 4];
        m.classes.push(ClassSection { name: "Foo".into(), descriptor: vec![9, 9] });
        m
    }

    #[test]
    fn roundtrip_without_stackmap() {
        let m = sample();
        let bytes = m.encode();
        let decoded = CompiledModule::decode(&bytes).unwrap();
        assert_eq!(decoded.metadata.module_name, "main");
        assert_eq!(decoded.globals_table, vec![1, 2, 3, 4]);
        assert_eq!(decoded.classes.len(), 1);
        assert!(decoded.stack_map.is_none());
    }

    #[test]
    fn roundtrip_with_stackmap() {
        let mut m = sample();
        m.stack_map = Some(vec![5, 6, 7]);
        let bytes = m.encode();
        let decoded = CompiledModule::decode(&bytes).unwrap();
        assert_eq!(decoded.stack_map, Some(vec![5, 6, 7]));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(CompiledModule::decode(&bytes), Err(ModuleError::InvalidMagic(_))));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(CompiledModule::decode(&bytes), Err(ModuleError::ChecksumMismatch { .. })));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = sample().encode();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(CompiledModule::decode(&bytes), Err(ModuleError::UnsupportedVersion(99))));
    }
}
