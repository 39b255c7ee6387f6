/*! Constant pool entries and typed lookups.
 *
 * Entries are read with binrw, one tag byte selecting the variant. Long and double entries occupy
 * two indices; the second is left empty so that pool indices can be used directly.
 */

use crate::{ParseError, Result};
use binrw::{BinRead, BinResult, BinWrite};
use classport_core::instructions::MemberRef;
use classport_core::values::ConstantValue;
use std::io::Seek;

#[derive(Debug, Clone, PartialEq, BinRead, BinWrite)]
#[brw(big)]
pub enum CpEntry {
    #[brw(magic = 1u8)]
    Utf8 {
        length: u16,
        #[br(count = length as usize)]
        bytes: Vec<u8>,
    },
    #[brw(magic = 3u8)]
    Integer(i32),
    #[brw(magic = 4u8)]
    Float(f32),
    #[brw(magic = 5u8)]
    Long(i64),
    #[brw(magic = 6u8)]
    Double(f64),
    #[brw(magic = 7u8)]
    Class { name_index: u16 },
    #[brw(magic = 8u8)]
    String { string_index: u16 },
    #[brw(magic = 9u8)]
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    #[brw(magic = 10u8)]
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    #[brw(magic = 11u8)]
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    #[brw(magic = 12u8)]
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    #[brw(magic = 15u8)]
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    #[brw(magic = 16u8)]
    MethodType { descriptor_index: u16 },
    #[brw(magic = 17u8)]
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    #[brw(magic = 18u8)]
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    #[brw(magic = 19u8)]
    Module { name_index: u16 },
    #[brw(magic = 20u8)]
    Package { name_index: u16 },
}

impl CpEntry {
    pub fn tag(&self) -> u8 {
        match self {
            CpEntry::Utf8 { .. } => 1,
            CpEntry::Integer(_) => 3,
            CpEntry::Float(_) => 4,
            CpEntry::Long(_) => 5,
            CpEntry::Double(_) => 6,
            CpEntry::Class { .. } => 7,
            CpEntry::String { .. } => 8,
            CpEntry::FieldRef { .. } => 9,
            CpEntry::MethodRef { .. } => 10,
            CpEntry::InterfaceMethodRef { .. } => 11,
            CpEntry::NameAndType { .. } => 12,
            CpEntry::MethodHandle { .. } => 15,
            CpEntry::MethodType { .. } => 16,
            CpEntry::Dynamic { .. } => 17,
            CpEntry::InvokeDynamic { .. } => 18,
            CpEntry::Module { .. } => 19,
            CpEntry::Package { .. } => 20,
        }
    }

    /// Takes two pool indices.
    pub fn is_wide(&self) -> bool {
        matches!(self, CpEntry::Long(_) | CpEntry::Double(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            CpEntry::Utf8 { .. } => "Utf8",
            CpEntry::Integer(_) => "Integer",
            CpEntry::Float(_) => "Float",
            CpEntry::Long(_) => "Long",
            CpEntry::Double(_) => "Double",
            CpEntry::Class { .. } => "Class",
            CpEntry::String { .. } => "String",
            CpEntry::FieldRef { .. } => "Fieldref",
            CpEntry::MethodRef { .. } => "Methodref",
            CpEntry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            CpEntry::NameAndType { .. } => "NameAndType",
            CpEntry::MethodHandle { .. } => "MethodHandle",
            CpEntry::MethodType { .. } => "MethodType",
            CpEntry::Dynamic { .. } => "Dynamic",
            CpEntry::InvokeDynamic { .. } => "InvokeDynamic",
            CpEntry::Module { .. } => "Module",
            CpEntry::Package { .. } => "Package",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Option<CpEntry>>,
}

/// Reads `count - 1` entries; `count` is the classfile's `constant_pool_count`.
#[binrw::parser(reader, endian)]
pub fn parse_constant_pool(count: u16) -> BinResult<ConstantPool> {
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(None);
    while entries.len() < count as usize {
        let entry = CpEntry::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        entries.push(Some(entry));
        if wide {
            entries.push(None);
        }
    }
    if entries.len() != count as usize {
        return Err(binrw::Error::AssertFail {
            pos: reader.stream_position()?,
            message: "wide constant overruns constant_pool_count".to_string(),
        });
    }
    Ok(ConstantPool { entries })
}

#[binrw::writer(writer, endian)]
pub fn write_constant_pool(pool: &ConstantPool) -> BinResult<()> {
    for entry in pool.entries.iter().flatten() {
        entry.write_options(writer, endian, ())?;
    }
    Ok(())
}

impl ConstantPool {
    pub fn from_entries(entries: Vec<Option<CpEntry>>) -> Self {
        Self { entries }
    }

    /// Value of `constant_pool_count`: one more than the highest index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u16, &CpEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u16, e)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&CpEntry> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ParseError::BadIndex(index))
    }

    fn wrong(&self, index: u16, expected: &'static str) -> ParseError {
        ParseError::WrongEntry {
            index,
            expected,
            found: self
                .get(index)
                .map(|e| e.kind().to_string())
                .unwrap_or_else(|_| "nothing".to_string()),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpEntry::Utf8 { bytes, .. } => {
                decode_modified_utf8(bytes).ok_or(ParseError::BadUtf8(index))
            }
            _ => Err(self.wrong(index, "Utf8")),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpEntry::Class { name_index } => self.utf8(*name_index),
            _ => Err(self.wrong(index, "Class")),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            CpEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(self.wrong(index, "NameAndType")),
        }
    }

    /// Field, method or interface method reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        match self.get(index)? {
            CpEntry::FieldRef {
                class_index,
                name_and_type_index,
            }
            | CpEntry::MethodRef {
                class_index,
                name_and_type_index,
            }
            | CpEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let owner = self.class_name(*class_index)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef::new(&owner, &name, &descriptor))
            }
            _ => Err(self.wrong(index, "member reference")),
        }
    }

    /// `(name, descriptor, bootstrap index)` of an invokedynamic call site.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(String, String, u16)> {
        match self.get(index)? {
            CpEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok((name, descriptor, *bootstrap_method_attr_index))
            }
            _ => Err(self.wrong(index, "InvokeDynamic")),
        }
    }

    /// A constant `ldc` can push.
    pub fn loadable(&self, index: u16) -> Result<ConstantValue> {
        Ok(match self.get(index)? {
            CpEntry::Integer(value) => ConstantValue::Int(*value),
            CpEntry::Float(value) => ConstantValue::Float(*value),
            CpEntry::Long(value) => ConstantValue::Long(*value),
            CpEntry::Double(value) => ConstantValue::Double(*value),
            CpEntry::String { string_index } => ConstantValue::String(self.utf8(*string_index)?),
            CpEntry::Class { name_index } => ConstantValue::Class(self.utf8(*name_index)?),
            _ => return Err(self.wrong(index, "loadable constant")),
        })
    }
}

/// Decodes the classfile flavour of UTF-8: nulls are two bytes and supplementary characters are
/// surrogate pairs, each half encoded on its own.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return None;
            }
            units.push(b0);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1)? as u16;
            if b1 & 0xC0 != 0x80 {
                return None;
            }
            units.push(((b0 & 0x1F) << 6) | (b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1)? as u16;
            let b2 = *bytes.get(i + 2)? as u16;
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push(((b0 & 0x0F) << 12) | ((b1 & 0x3F) << 6) | (b2 & 0x3F));
            i += 3;
        } else {
            return None;
        }
    }
    Some(
        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    )
}

/// Inverse of [`decode_modified_utf8`].
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_modified_utf8_null_and_supplementary() {
        let text = "a\u{0}b\u{1F600}";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[1..3], &[0xC0, 0x80]);
        assert_eq!(encoded.len(), 1 + 2 + 1 + 6);
        assert_eq!(decode_modified_utf8(&encoded).as_deref(), Some(text));
    }

    #[test]
    fn test_raw_null_byte_is_rejected() {
        assert_eq!(decode_modified_utf8(&[b'a', 0, b'b']), None);
        assert_eq!(decode_modified_utf8(&[0xC0]), None);
    }

    #[test]
    fn test_typed_lookups() {
        let utf8 = |s: &str| {
            let bytes = encode_modified_utf8(s);
            Some(CpEntry::Utf8 {
                length: bytes.len() as u16,
                bytes,
            })
        };
        let pool = ConstantPool::from_entries(vec![
            None,
            utf8("app/Main"),
            Some(CpEntry::Class { name_index: 1 }),
            Some(CpEntry::Long(7)),
            None,
        ]);

        assert_eq!(pool.class_name(2).unwrap(), "app/Main");
        assert_eq!(pool.loadable(3).unwrap(), ConstantValue::Long(7));
        assert!(matches!(pool.get(4), Err(ParseError::BadIndex(4))));
        assert!(matches!(
            pool.class_name(1),
            Err(ParseError::WrongEntry { expected: "Class", .. })
        ));
    }
}
