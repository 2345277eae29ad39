//! Class-descriptor byte stream (spec §6): the format a module initializer
//! feeds to `init_class` at load time to install methods, fields and
//! attributes on a runtime class.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

pub const CMD_END: u32 = 0;
pub const CMD_ADD_METHOD: u32 = 1;
pub const CMD_ADD_FIELD: u32 = 2;
pub const CMD_MARK_SYSTEM_CLASS: u32 = 3;
pub const CMD_MARK_FOREIGN_CLASS: u32 = 4;
pub const CMD_ADD_ATTRIBUTE_GROUP: u32 = 5;

pub const METHOD_FLAG_STATIC: u32 = 1;
pub const METHOD_FLAG_FOREIGN: u32 = 2;

/// Value kind for an attribute payload, as laid out in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Value = 0,
    Boolean = 1,
    String = 2,
}

impl AttributeType {
    fn from_u32(v: u32) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(AttributeType::Value),
            1 => Ok(AttributeType::Boolean),
            2 => Ok(AttributeType::String),
            other => Err(DecodeError::InvalidTag(other)),
        }
    }
}

/// A single entry in an `ADD_ATTRIBUTE_GROUP` command.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
    /// For `Boolean`, 0/1. For `String`, the string is stored in `payload_str`.
    /// For `Value`, an f64 bit-pattern.
    pub payload_bits: u64,
    pub payload_str: Option<String>,
}

/// One decoded command from a class-descriptor stream.
#[derive(Debug, Clone)]
pub enum ClassCommand {
    AddMethod { signature: String, function_index: u32, is_static: bool, is_foreign: bool },
    AddField { name: String },
    MarkSystemClass,
    MarkForeignClass,
    AddAttributeGroup { group: String, method_index: i32, attributes: Vec<Attribute> },
}

/// Builds a class-descriptor byte stream.
#[derive(Debug, Default)]
pub struct ClassDescriptorBuilder {
    w: BytecodeWriter,
}

impl ClassDescriptorBuilder {
    pub fn new() -> Self {
        Self { w: BytecodeWriter::new() }
    }

    pub fn add_method(&mut self, signature: &str, function_index: u32, is_static: bool, is_foreign: bool) {
        let mut flags = 0u32;
        if is_static {
            flags |= METHOD_FLAG_STATIC;
        }
        if is_foreign {
            flags |= METHOD_FLAG_FOREIGN;
        }
        self.w.emit_u32(CMD_ADD_METHOD);
        self.w.emit_u32(flags);
        self.w.emit_string(signature);
        self.w.emit_u32(function_index);
    }

    pub fn add_field(&mut self, name: &str) {
        self.w.emit_u32(CMD_ADD_FIELD);
        self.w.emit_u32(0);
        self.w.emit_string(name);
    }

    pub fn mark_system_class(&mut self) {
        self.w.emit_u32(CMD_MARK_SYSTEM_CLASS);
        self.w.emit_u32(0);
    }

    pub fn mark_foreign_class(&mut self) {
        self.w.emit_u32(CMD_MARK_FOREIGN_CLASS);
        self.w.emit_u32(0);
    }

    pub fn add_attribute_group(&mut self, group: &str, method_index: i32, attributes: &[Attribute]) {
        self.w.emit_u32(CMD_ADD_ATTRIBUTE_GROUP);
        self.w.emit_u32(0);
        self.w.emit_string(group);
        self.w.emit_u32(method_index as u32);
        self.w.emit_u32(attributes.len() as u32);
        for attr in attributes {
            self.w.emit_string(&attr.name);
            self.w.emit_u32(attr.ty as u32);
            self.w.emit_u64(attr.payload_bits);
            match &attr.payload_str {
                Some(s) => {
                    self.w.emit_u8(1);
                    self.w.emit_string(s);
                }
                None => self.w.emit_u8(0),
            }
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.w.emit_u32(CMD_END);
        self.w.emit_u32(0);
        self.w.into_bytes()
    }
}

/// Decodes a full class-descriptor stream into a command list.
pub fn decode(bytes: &[u8]) -> Result<Vec<ClassCommand>, DecodeError> {
    let mut r = BytecodeReader::new(bytes);
    let mut commands = Vec::new();
    loop {
        let id = r.read_u32()?;
        let _flags = r.read_u32()?;
        match id {
            CMD_END => break,
            CMD_ADD_METHOD => {
                let signature = r.read_string()?;
                let function_index = r.read_u32()?;
                commands.push(ClassCommand::AddMethod {
                    is_static: _flags & METHOD_FLAG_STATIC != 0,
                    is_foreign: _flags & METHOD_FLAG_FOREIGN != 0,
                    signature,
                    function_index,
                });
            }
            CMD_ADD_FIELD => {
                commands.push(ClassCommand::AddField { name: r.read_string()? });
            }
            CMD_MARK_SYSTEM_CLASS => commands.push(ClassCommand::MarkSystemClass),
            CMD_MARK_FOREIGN_CLASS => commands.push(ClassCommand::MarkForeignClass),
            CMD_ADD_ATTRIBUTE_GROUP => {
                let group = r.read_string()?;
                let method_index = r.read_u32()? as i32;
                let count = r.read_u32()?;
                let mut attributes = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = r.read_string()?;
                    let ty = AttributeType::from_u32(r.read_u32()?)?;
                    let payload_bits = r.read_u64()?;
                    let has_str = r.read_u8()? != 0;
                    let payload_str = if has_str { Some(r.read_string()?) } else { None };
                    attributes.push(Attribute { name, ty, payload_bits, payload_str });
                }
                commands.push(ClassCommand::AddAttributeGroup { group, method_index, attributes });
            }
            other => return Err(DecodeError::InvalidTag(other)),
        }
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_method_and_field() {
        let mut b = ClassDescriptorBuilder::new();
        b.add_field("count");
        b.add_method("foo(_,_)", 3, false, false);
        b.add_method("new(_)", 0, true, false);
        let bytes = b.finish();

        let commands = decode(&bytes).unwrap();
        assert_eq!(commands.len(), 3);
        match &commands[0] {
            ClassCommand::AddField { name } => assert_eq!(name, "count"),
            other => panic!("unexpected {other:?}"),
        }
        match &commands[1] {
            ClassCommand::AddMethod { signature, function_index, is_static, .. } => {
                assert_eq!(signature, "foo(_,_)");
                assert_eq!(*function_index, 3);
                assert!(!is_static);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_and_system_markers() {
        let mut b = ClassDescriptorBuilder::new();
        b.mark_foreign_class();
        b.mark_system_class();
        let bytes = b.finish();
        let commands = decode(&bytes).unwrap();
        assert!(matches!(commands[0], ClassCommand::MarkForeignClass));
        assert!(matches!(commands[1], ClassCommand::MarkSystemClass));
    }

    #[test]
    fn attribute_group_roundtrip() {
        let mut b = ClassDescriptorBuilder::new();
        let attrs = vec![Attribute {
            name: "doc".into(),
            ty: AttributeType::String,
            payload_bits: 0,
            payload_str: Some("hello".into()),
        }];
        b.add_attribute_group("meta", -1, &attrs);
        let bytes = b.finish();
        let commands = decode(&bytes).unwrap();
        match &commands[0] {
            ClassCommand::AddAttributeGroup { group, method_index, attributes } => {
                assert_eq!(group, "meta");
                assert_eq!(*method_index, -1);
                assert_eq!(attributes[0].payload_str.as_deref(), Some("hello"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_stream_is_just_end() {
        let b = ClassDescriptorBuilder::new();
        let bytes = b.finish();
        assert!(decode(&bytes).unwrap().is_empty());
    }
}
