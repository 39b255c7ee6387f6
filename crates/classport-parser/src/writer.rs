/*! Classfile writer.
 *
 * The inverse of [`crate::reader`], used to produce real binary classfiles from builder-made
 * classes. Instruction offsets in the input only need to be ordered; they are laid out again here,
 * with switch padding, compact constant encodings and `wide` forms chosen per instruction.
 */

use crate::classfile::{RawAttribute, RawClassFile, RawCode, RawExceptions, RawHandler, RawMember};
use crate::constant_pool::{encode_modified_utf8, ConstantPool, CpEntry};
use crate::{ParseError, Result};
use binrw::{BinWrite, BinWriterExt};
use classport_core::class::{ClassRecord, FieldRecord};
use classport_core::instructions::{
    ArithOp, ArrayElem, BranchOperands, Condition, FieldOp, Instruction, InvokeKind, MemberRef,
    NarrowKind, StackOp,
};
use classport_core::method::MethodRecord;
use classport_core::types::JavaType;
use classport_core::values::{ConstantValue, ValueKind};
use std::collections::HashMap;
use std::io::Cursor;

pub fn write_class(class: &ClassRecord) -> Result<Vec<u8>> {
    ClassWriter::new().write(class)
}

fn code_error(reason: String) -> ParseError {
    ParseError::Attribute {
        attribute: "Code".to_string(),
        reason,
    }
}

fn kind_index(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Int => 0,
        ValueKind::Long => 1,
        ValueKind::Float => 2,
        ValueKind::Double => 3,
        ValueKind::Ref => 4,
    }
}

fn elem_index(elem: ArrayElem) -> u8 {
    match elem {
        ArrayElem::Int => 0,
        ArrayElem::Long => 1,
        ArrayElem::Float => 2,
        ArrayElem::Double => 3,
        ArrayElem::Ref => 4,
        ArrayElem::Byte => 5,
        ArrayElem::Char => 6,
        ArrayElem::Short => 7,
    }
}

fn cond_index(cond: Condition) -> u8 {
    match cond {
        Condition::Eq => 0,
        Condition::Ne => 1,
        Condition::Lt => 2,
        Condition::Ge => 3,
        Condition::Gt => 4,
        Condition::Le => 5,
    }
}

#[derive(Debug, Default)]
pub struct ClassWriter {
    entries: Vec<Option<CpEntry>>,
    index: HashMap<Vec<u8>, u16>,
    field_signatures: HashMap<String, String>,
}

impl ClassWriter {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            ..Self::default()
        }
    }

    /// Attaches a generic `Signature` attribute to the named field.
    pub fn field_signature(mut self, field: &str, signature: &str) -> Self {
        self.field_signatures
            .insert(field.to_string(), signature.to_string());
        self
    }

    fn add(&mut self, entry: CpEntry) -> Result<u16> {
        let mut key = Cursor::new(Vec::new());
        entry.write(&mut key)?;
        let key = key.into_inner();
        if let Some(index) = self.index.get(&key) {
            return Ok(*index);
        }
        let index = u16::try_from(self.entries.len()).map_err(|_| ParseError::Attribute {
            attribute: "constant pool".to_string(),
            reason: "more than 65535 entries".to_string(),
        })?;
        let wide = entry.is_wide();
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        self.index.insert(key, index);
        Ok(index)
    }

    pub fn utf8(&mut self, text: &str) -> Result<u16> {
        let bytes = encode_modified_utf8(text);
        self.add(CpEntry::Utf8 {
            length: bytes.len() as u16,
            bytes,
        })
    }

    pub fn class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        self.add(CpEntry::Class { name_index })
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        let descriptor_index = self.utf8(descriptor)?;
        self.add(CpEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    fn member(&mut self, member: &MemberRef, tag: u8) -> Result<u16> {
        let class_index = self.class(&member.owner)?;
        let name_and_type_index = self.name_and_type(&member.name, &member.descriptor)?;
        self.add(match tag {
            9 => CpEntry::FieldRef {
                class_index,
                name_and_type_index,
            },
            11 => CpEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            },
            _ => CpEntry::MethodRef {
                class_index,
                name_and_type_index,
            },
        })
    }

    pub fn constant(&mut self, value: &ConstantValue) -> Result<u16> {
        match value {
            ConstantValue::Int(v) => self.add(CpEntry::Integer(*v)),
            ConstantValue::Long(v) => self.add(CpEntry::Long(*v)),
            ConstantValue::Float(v) => self.add(CpEntry::Float(*v)),
            ConstantValue::Double(v) => self.add(CpEntry::Double(*v)),
            ConstantValue::String(s) => {
                let string_index = self.utf8(s)?;
                self.add(CpEntry::String { string_index })
            }
            ConstantValue::Class(name) => self.class(name),
        }
    }

    fn attribute(&mut self, name: &str, info: Vec<u8>) -> Result<RawAttribute> {
        Ok(RawAttribute::new(self.utf8(name)?, info))
    }

    pub fn write(mut self, class: &ClassRecord) -> Result<Vec<u8>> {
        let this_class = self.class(&class.name)?;
        let super_class = match &class.super_name {
            Some(name) => self.class(name)?,
            None => 0,
        };
        let interfaces = class
            .interfaces
            .iter()
            .map(|i| self.class(i))
            .collect::<Result<Vec<_>>>()?;
        let fields = class
            .fields
            .iter()
            .map(|f| self.field(f))
            .collect::<Result<Vec<_>>>()?;
        let methods = class
            .methods
            .iter()
            .map(|m| self.method(m))
            .collect::<Result<Vec<_>>>()?;
        let mut attributes = Vec::new();
        if let Some(source) = &class.source_file {
            let index = self.utf8(source)?;
            attributes.push(self.attribute("SourceFile", index.to_be_bytes().to_vec())?);
        }

        let raw = RawClassFile {
            minor_version: 0,
            major_version: class.major_version,
            constant_pool_count: self.entries.len() as u16,
            constant_pool: ConstantPool::from_entries(std::mem::take(&mut self.entries)),
            access_flags: class.flags.bits(),
            this_class,
            super_class,
            interfaces_count: interfaces.len() as u16,
            interfaces,
            fields_count: fields.len() as u16,
            fields,
            methods_count: methods.len() as u16,
            methods,
            attributes_count: attributes.len() as u16,
            attributes,
        };
        let mut out = Cursor::new(Vec::new());
        raw.write(&mut out)?;
        Ok(out.into_inner())
    }

    fn field(&mut self, field: &FieldRecord) -> Result<RawMember> {
        let mut attributes = Vec::new();
        if let Some(value) = &field.constant {
            let index = self.constant(value)?;
            attributes.push(self.attribute("ConstantValue", index.to_be_bytes().to_vec())?);
        }
        if let Some(signature) = self.field_signatures.get(&field.name).cloned() {
            let index = self.utf8(&signature)?;
            attributes.push(self.attribute("Signature", index.to_be_bytes().to_vec())?);
        }
        Ok(RawMember {
            access_flags: field.flags.bits(),
            name_index: self.utf8(&field.name)?,
            descriptor_index: self.utf8(&field.descriptor)?,
            attributes_count: attributes.len() as u16,
            attributes,
        })
    }

    fn method(&mut self, method: &MethodRecord) -> Result<RawMember> {
        let mut attributes = Vec::new();
        if method.has_body() {
            let code = self.code(method)?;
            let mut info = Cursor::new(Vec::new());
            code.write(&mut info)?;
            attributes.push(self.attribute("Code", info.into_inner())?);
        }
        if !method.throws.is_empty() {
            let exception_index_table = method
                .throws
                .iter()
                .map(|t| self.class(t))
                .collect::<Result<Vec<_>>>()?;
            let mut info = Cursor::new(Vec::new());
            RawExceptions {
                number_of_exceptions: exception_index_table.len() as u16,
                exception_index_table,
            }
            .write(&mut info)?;
            attributes.push(self.attribute("Exceptions", info.into_inner())?);
        }
        Ok(RawMember {
            access_flags: method.flags.bits(),
            name_index: self.utf8(&method.name)?,
            descriptor_index: self.utf8(&method.descriptor)?,
            attributes_count: attributes.len() as u16,
            attributes,
        })
    }

    fn code(&mut self, method: &MethodRecord) -> Result<RawCode> {
        // First pass only fixes addresses; instruction sizes never depend on jump distances.
        let mut layout = Vec::with_capacity(method.instructions.len());
        let mut sizing = Cursor::new(Vec::new());
        for insn in &method.instructions {
            let addr = sizing.position() as u32;
            layout.push((insn.offset, addr));
            self.encode(&mut sizing, &insn.op, &|_| Ok(addr))?;
        }
        let code_length = sizing.position() as u32;
        let resolve = |offset: u32| -> Result<u32> {
            match layout.binary_search_by_key(&offset, |(old, _)| *old) {
                Ok(i) => Ok(layout[i].1),
                Err(i) if i == layout.len() => Ok(code_length),
                Err(_) => Err(code_error(format!(
                    "{}: offset {} is not an instruction",
                    method.qualified_name(),
                    offset
                ))),
            }
        };

        let mut out = Cursor::new(Vec::new());
        for insn in &method.instructions {
            self.encode(&mut out, &insn.op, &resolve)?;
        }
        let mut exception_table = Vec::with_capacity(method.handlers.len());
        for handler in &method.handlers {
            exception_table.push(RawHandler {
                start_pc: resolve(handler.start)? as u16,
                end_pc: resolve(handler.end)? as u16,
                handler_pc: resolve(handler.handler)? as u16,
                catch_type: match &handler.catch_type {
                    Some(name) => self.class(name)?,
                    None => 0,
                },
            });
        }
        let code = out.into_inner();
        Ok(RawCode {
            max_stack: method.max_stack,
            max_locals: method.max_locals,
            code_length: code.len() as u32,
            code,
            exception_table_length: exception_table.len() as u16,
            exception_table,
            attributes_count: 0,
            attributes: Vec::new(),
        })
    }

    fn ldc(&mut self, out: &mut Cursor<Vec<u8>>, value: &ConstantValue) -> Result<()> {
        let index = self.constant(value)?;
        if value.kind().is_wide() {
            out.write_be(&0x14u8)?;
            out.write_be(&index)?;
        } else if index <= u8::MAX as u16 {
            out.write_be(&0x12u8)?;
            out.write_be(&(index as u8))?;
        } else {
            out.write_be(&0x13u8)?;
            out.write_be(&index)?;
        }
        Ok(())
    }

    fn local(&mut self, out: &mut Cursor<Vec<u8>>, short_base: u8, long_base: u8, kind: ValueKind, slot: u16) -> Result<()> {
        let k = kind_index(kind);
        if slot <= 3 {
            out.write_be(&(short_base + k * 4 + slot as u8))?;
        } else if slot <= u8::MAX as u16 {
            out.write_be(&(long_base + k))?;
            out.write_be(&(slot as u8))?;
        } else {
            out.write_be(&crate::bytecode::WIDE)?;
            out.write_be(&(long_base + k))?;
            out.write_be(&slot)?;
        }
        Ok(())
    }

    fn encode(
        &mut self,
        out: &mut Cursor<Vec<u8>>,
        op: &Instruction,
        jump: &dyn Fn(u32) -> Result<u32>,
    ) -> Result<()> {
        let addr = out.position() as u32;
        let relative = |target: u32| -> Result<i32> { Ok(jump(target)? as i32 - addr as i32) };
        let short = |target: u32| -> Result<i16> {
            i16::try_from(relative(target)?).map_err(|_| {
                code_error(format!("branch at {} does not fit a 16-bit offset", addr))
            })
        };

        match op {
            Instruction::Nop => out.write_be(&0x00u8)?,
            Instruction::ConstNull => out.write_be(&0x01u8)?,
            Instruction::Const(value) => match value {
                ConstantValue::Int(v @ -1..=5) => out.write_be(&((v + 3) as u8))?,
                ConstantValue::Int(v) if i8::try_from(*v).is_ok() => {
                    out.write_be(&0x10u8)?;
                    out.write_be(&(*v as i8))?;
                }
                ConstantValue::Int(v) if i16::try_from(*v).is_ok() => {
                    out.write_be(&0x11u8)?;
                    out.write_be(&(*v as i16))?;
                }
                ConstantValue::Long(v @ 0..=1) => out.write_be(&(0x09 + *v as u8))?,
                ConstantValue::Float(v)
                    if [0.0f32, 1.0, 2.0].iter().any(|c| c.to_bits() == v.to_bits()) =>
                {
                    out.write_be(&(0x0b + *v as u8))?
                }
                ConstantValue::Double(v)
                    if [0.0f64, 1.0].iter().any(|c| c.to_bits() == v.to_bits()) =>
                {
                    out.write_be(&(0x0e + *v as u8))?
                }
                other => self.ldc(out, other)?,
            },
            Instruction::Load { kind, slot } => self.local(out, 0x1a, 0x15, *kind, *slot)?,
            Instruction::Store { kind, slot } => self.local(out, 0x3b, 0x36, *kind, *slot)?,
            Instruction::Stack(stack) => out.write_be(&match stack {
                StackOp::Pop => 0x57u8,
                StackOp::Pop2 => 0x58,
                StackOp::Dup => 0x59,
                StackOp::DupX1 => 0x5a,
                StackOp::DupX2 => 0x5b,
                StackOp::Dup2 => 0x5c,
                StackOp::Dup2X1 => 0x5d,
                StackOp::Dup2X2 => 0x5e,
                StackOp::Swap => 0x5f,
            })?,
            Instruction::Arith { kind, op } => {
                let k = kind_index(*kind);
                let opcode = match op {
                    ArithOp::Add => 0x60 + k,
                    ArithOp::Sub => 0x64 + k,
                    ArithOp::Mul => 0x68 + k,
                    ArithOp::Div => 0x6c + k,
                    ArithOp::Rem => 0x70 + k,
                    ArithOp::Shl => 0x78 + k,
                    ArithOp::Shr => 0x7a + k,
                    ArithOp::Ushr => 0x7c + k,
                    ArithOp::And => 0x7e + k,
                    ArithOp::Or => 0x80 + k,
                    ArithOp::Xor => 0x82 + k,
                };
                out.write_be(&opcode)?;
            }
            Instruction::Neg(kind) => out.write_be(&(0x74 + kind_index(*kind)))?,
            Instruction::Convert { from, to } => {
                use ValueKind::*;
                let opcode: u8 = match (from, to) {
                    (Int, Long) => 0x85,
                    (Int, Float) => 0x86,
                    (Int, Double) => 0x87,
                    (Long, Int) => 0x88,
                    (Long, Float) => 0x89,
                    (Long, Double) => 0x8a,
                    (Float, Int) => 0x8b,
                    (Float, Long) => 0x8c,
                    (Float, Double) => 0x8d,
                    (Double, Int) => 0x8e,
                    (Double, Long) => 0x8f,
                    (Double, Float) => 0x90,
                    _ => return Err(code_error(format!("no conversion from {} to {}", from, to))),
                };
                out.write_be(&opcode)?;
            }
            Instruction::Narrow(narrow) => out.write_be(&match narrow {
                NarrowKind::Byte => 0x91u8,
                NarrowKind::Char => 0x92,
                NarrowKind::Short => 0x93,
            })?,
            Instruction::Compare(cmp) => out.write_be(&match (cmp.kind, cmp.nan_result) {
                (ValueKind::Float, r) if r < 0 => 0x95u8,
                (ValueKind::Float, _) => 0x96,
                (ValueKind::Double, r) if r < 0 => 0x97,
                (ValueKind::Double, _) => 0x98,
                _ => 0x94,
            })?,
            Instruction::Iinc { slot, delta } => {
                if *slot <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                    out.write_be(&0x84u8)?;
                    out.write_be(&(*slot as u8))?;
                    out.write_be(&(*delta as i8))?;
                } else {
                    out.write_be(&crate::bytecode::WIDE)?;
                    out.write_be(&0x84u8)?;
                    out.write_be(slot)?;
                    out.write_be(delta)?;
                }
            }
            Instruction::Goto { target } => {
                out.write_be(&0xa7u8)?;
                out.write_be(&short(*target)?)?;
            }
            Instruction::If {
                cond,
                operands,
                target,
            } => {
                let c = cond_index(*cond);
                let opcode = match (operands, cond) {
                    (BranchOperands::IntZero, _) => 0x99 + c,
                    (BranchOperands::IntPair, _) => 0x9f + c,
                    (BranchOperands::RefPair, Condition::Eq | Condition::Ne) => 0xa5 + c,
                    (BranchOperands::Null, Condition::Eq) => 0xc6,
                    (BranchOperands::Null, Condition::Ne) => 0xc7,
                    _ => return Err(code_error(format!("no {:?} branch on {:?}", cond, operands))),
                };
                out.write_be(&opcode)?;
                out.write_be(&short(*target)?)?;
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                out.write_be(&0xaau8)?;
                pad(out)?;
                out.write_be(&relative(*default)?)?;
                out.write_be(low)?;
                out.write_be(high)?;
                for target in targets {
                    out.write_be(&relative(*target)?)?;
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut sorted = pairs.clone();
                sorted.sort_by_key(|(key, _)| *key);
                out.write_be(&0xabu8)?;
                pad(out)?;
                out.write_be(&relative(*default)?)?;
                out.write_be(&(sorted.len() as i32))?;
                for (key, target) in sorted {
                    out.write_be(&key)?;
                    out.write_be(&relative(target)?)?;
                }
            }
            Instruction::Field { op, field } => {
                let index = self.member(field, 9)?;
                out.write_be(&match op {
                    FieldOp::GetStatic => 0xb2u8,
                    FieldOp::PutStatic => 0xb3,
                    FieldOp::GetField => 0xb4,
                    FieldOp::PutField => 0xb5,
                })?;
                out.write_be(&index)?;
            }
            Instruction::ArrayLoad(elem) => out.write_be(&(0x2e + elem_index(*elem)))?,
            Instruction::ArrayStore(elem) => out.write_be(&(0x4f + elem_index(*elem)))?,
            Instruction::ArrayLength => out.write_be(&0xbeu8)?,
            Instruction::Invoke { kind, method } => match kind {
                InvokeKind::Interface => {
                    let index = self.member(method, 11)?;
                    let descriptor = classport_core::MethodDescriptor::parse(&method.descriptor)?;
                    out.write_be(&0xb9u8)?;
                    out.write_be(&index)?;
                    out.write_be(&((descriptor.arg_slots() + 1) as u8))?;
                    out.write_be(&0u8)?;
                }
                other => {
                    let index = self.member(method, 10)?;
                    out.write_be(&match other {
                        InvokeKind::Virtual => 0xb6u8,
                        InvokeKind::Special => 0xb7,
                        _ => 0xb8,
                    })?;
                    out.write_be(&index)?;
                }
            },
            Instruction::InvokeDynamic { .. } => {
                return Err(ParseError::UnsupportedOpcode {
                    method: "<writer>".to_string(),
                    name: "invokedynamic",
                    offset: addr,
                })
            }
            Instruction::New(class) => {
                let index = self.class(class)?;
                out.write_be(&0xbbu8)?;
                out.write_be(&index)?;
            }
            Instruction::NewArray(element) => match primitive_atype(element) {
                Some(atype) => {
                    out.write_be(&0xbcu8)?;
                    out.write_be(&atype)?;
                }
                None => {
                    let index = self.class(&class_constant(element))?;
                    out.write_be(&0xbdu8)?;
                    out.write_be(&index)?;
                }
            },
            Instruction::MultiNewArray { ty, dims } => {
                let index = self.class(&class_constant(ty))?;
                out.write_be(&0xc5u8)?;
                out.write_be(&index)?;
                out.write_be(dims)?;
            }
            Instruction::CheckCast(class) | Instruction::InstanceOf(class) => {
                let index = self.class(class)?;
                let opcode = if matches!(op, Instruction::CheckCast(_)) {
                    0xc0u8
                } else {
                    0xc1
                };
                out.write_be(&opcode)?;
                out.write_be(&index)?;
            }
            Instruction::Throw => out.write_be(&0xbfu8)?,
            Instruction::MonitorEnter => out.write_be(&0xc2u8)?,
            Instruction::MonitorExit => out.write_be(&0xc3u8)?,
            Instruction::Return(kind) => out.write_be(&match kind {
                Some(kind) => 0xac + kind_index(*kind),
                None => 0xb1u8,
            })?,
        }
        Ok(())
    }
}

fn pad(out: &mut Cursor<Vec<u8>>) -> Result<()> {
    while out.position() % 4 != 0 {
        out.write_be(&0u8)?;
    }
    Ok(())
}

fn primitive_atype(element: &JavaType) -> Option<u8> {
    Some(match element {
        JavaType::Boolean => 4,
        JavaType::Char => 5,
        JavaType::Float => 6,
        JavaType::Double => 7,
        JavaType::Byte => 8,
        JavaType::Short => 9,
        JavaType::Int => 10,
        JavaType::Long => 11,
        _ => return None,
    })
}

/// Class constants name plain classes directly and arrays by descriptor.
fn class_constant(ty: &JavaType) -> String {
    match ty {
        JavaType::Object(name) => name.clone(),
        other => other.to_string(),
    }
}
