/*! Turns a raw classfile into a [`ClassRecord`].
 *
 * Supertypes are kept by name only; linking them to table entries is the class table's second pass,
 * so classes can be read in whatever order the filesystem hands them out.
 */

use crate::bytecode;
use crate::classfile::{RawAttribute, RawClassFile, RawCode, RawExceptions, RawHeader, RawMember};
use crate::constant_pool::ConstantPool;
use crate::signature;
use crate::{ParseError, Result};
use binrw::BinRead;
use classport_core::class::{ClassAccessFlags, ClassRecord, FieldAccessFlags, FieldRecord};
use classport_core::method::{ExceptionHandler, MethodAccessFlags, MethodRecord};
use classport_core::types::JavaType;
use classport_core::values::ConstantValue;
use std::io::Cursor;
use tracing::debug;

/// Java 1.1.
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Java 25.
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Reads one classfile.
pub fn parse_class(bytes: &[u8]) -> Result<ClassRecord> {
    let header = RawHeader::read(&mut Cursor::new(bytes))?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&header.major_version) {
        return Err(ParseError::UnsupportedVersion {
            major: header.major_version,
            minor: header.minor_version,
        });
    }
    let raw = RawClassFile::read(&mut Cursor::new(bytes))?;
    ClassReader { raw: &raw }.read()
}

struct ClassReader<'r> {
    raw: &'r RawClassFile,
}

impl<'r> ClassReader<'r> {
    fn pool(&self) -> &'r ConstantPool {
        &self.raw.constant_pool
    }

    fn attribute<'a>(&self, attributes: &'a [RawAttribute], name: &str) -> Result<Option<&'a RawAttribute>> {
        for attribute in attributes {
            if self.pool().utf8(attribute.name_index)? == name {
                return Ok(Some(attribute));
            }
        }
        Ok(None)
    }

    fn u16_attribute(&self, attribute: &RawAttribute, name: &str) -> Result<u16> {
        match attribute.info.as_slice() {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(ParseError::Attribute {
                attribute: name.to_string(),
                reason: format!("expected 2 bytes, found {}", attribute.info.len()),
            }),
        }
    }

    fn read(&self) -> Result<ClassRecord> {
        let raw = self.raw;
        let pool = self.pool();
        let name = pool.class_name(raw.this_class)?;
        let super_name = match raw.super_class {
            0 => None,
            index => Some(pool.class_name(index)?),
        };
        let mut class = ClassRecord::new(&name, super_name.as_deref());
        class.flags = ClassAccessFlags::from_bits_truncate(raw.access_flags);
        class.major_version = raw.major_version;
        for index in &raw.interfaces {
            class.interfaces.push(pool.class_name(*index)?);
        }
        if let Some(attribute) = self.attribute(&raw.attributes, "SourceFile")? {
            let index = self.u16_attribute(attribute, "SourceFile")?;
            class.source_file = Some(pool.utf8(index)?);
        }
        for field in &raw.fields {
            class.fields.push(self.field(field)?);
        }
        for method in &raw.methods {
            class.methods.push(self.method(&name, method)?);
        }
        debug!(
            class = %class.name,
            fields = class.fields.len(),
            methods = class.methods.len(),
            "parsed class"
        );
        Ok(class)
    }

    fn field(&self, raw: &RawMember) -> Result<FieldRecord> {
        let pool = self.pool();
        let name = pool.utf8(raw.name_index)?;
        let descriptor = pool.utf8(raw.descriptor_index)?;
        let ty = JavaType::parse(&descriptor)?;
        let mut field = FieldRecord::new(&name, ty, FieldAccessFlags::from_bits_truncate(raw.access_flags));

        if let Some(attribute) = self.attribute(&raw.attributes, "ConstantValue")? {
            let index = self.u16_attribute(attribute, "ConstantValue")?;
            field.constant = Some(match pool.loadable(index)? {
                ConstantValue::Class(_) => {
                    return Err(ParseError::Attribute {
                        attribute: "ConstantValue".to_string(),
                        reason: format!("field {} names a class constant", name),
                    })
                }
                value => value,
            });
        }

        if let Some(attribute) = self.attribute(&raw.attributes, "Signature")? {
            let text = self
                .u16_attribute(attribute, "Signature")
                .and_then(|index| pool.utf8(index));
            match text.ok().as_deref().and_then(signature::referenced_classes) {
                Some(classes) => field.dependencies.extend(classes),
                None => debug!(field = %name, "ignoring undecodable generic signature"),
            }
        }
        Ok(field)
    }

    fn method(&self, class: &str, raw: &RawMember) -> Result<MethodRecord> {
        let pool = self.pool();
        let name = pool.utf8(raw.name_index)?;
        let descriptor = pool.utf8(raw.descriptor_index)?;
        let flags = MethodAccessFlags::from_bits_truncate(raw.access_flags);
        let mut method = MethodRecord::new(class, &name, &descriptor, flags)?;

        if let Some(attribute) = self.attribute(&raw.attributes, "Code")? {
            let code = RawCode::read(&mut Cursor::new(&attribute.info))?;
            method.max_stack = code.max_stack;
            method.max_locals = code.max_locals;
            method.instructions = bytecode::decode(&code.code, pool, &method.qualified_name())?;
            for entry in &code.exception_table {
                method.handlers.push(ExceptionHandler {
                    start: entry.start_pc as u32,
                    end: entry.end_pc as u32,
                    handler: entry.handler_pc as u32,
                    catch_type: match entry.catch_type {
                        0 => None,
                        index => Some(pool.class_name(index)?),
                    },
                });
            }
        }

        if let Some(attribute) = self.attribute(&raw.attributes, "Exceptions")? {
            let exceptions = RawExceptions::read(&mut Cursor::new(&attribute.info))?;
            for index in exceptions.exception_index_table {
                method.throws.push(pool.class_name(index)?);
            }
        }

        method.compute_edges();
        Ok(method)
    }
}
