/*! Bytecode decoding.
 *
 * Opcodes are folded into the categorised [`Instruction`] set as they are read, with every
 * constant pool operand resolved on the spot. Branch operands are relative to the address of the
 * branching instruction and come out absolute. `jsr`, `jsr_w` and `ret` are rejected.
 */

use crate::constant_pool::ConstantPool;
use crate::{ParseError, Result};
use binrw::BinReaderExt;
use classport_core::instructions::{
    ArithOp, ArrayElem, BranchOperands, CompareOp, Condition, FieldOp, Insn, Instruction,
    InvokeKind, NarrowKind, StackOp,
};
use classport_core::types::JavaType;
use classport_core::values::{ConstantValue, ValueKind};
use std::io::Cursor;

const KINDS: [ValueKind; 5] = [
    ValueKind::Int,
    ValueKind::Long,
    ValueKind::Float,
    ValueKind::Double,
    ValueKind::Ref,
];

const ELEMS: [ArrayElem; 8] = [
    ArrayElem::Int,
    ArrayElem::Long,
    ArrayElem::Float,
    ArrayElem::Double,
    ArrayElem::Ref,
    ArrayElem::Byte,
    ArrayElem::Char,
    ArrayElem::Short,
];

const CONDITIONS: [Condition; 6] = [
    Condition::Eq,
    Condition::Ne,
    Condition::Lt,
    Condition::Ge,
    Condition::Gt,
    Condition::Le,
];

pub const WIDE: u8 = 0xc4;

struct CodeReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> CodeReader<'a> {
    fn new(code: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(code),
        }
    }

    fn pos(&self) -> u32 {
        self.cursor.position() as u32
    }

    fn at_end(&self) -> bool {
        self.cursor.position() as usize >= self.cursor.get_ref().len()
    }

    fn u8(&mut self) -> Result<u8> {
        let pos = self.pos();
        self.cursor.read_be().map_err(|_| ParseError::Truncated(pos))
    }

    fn i8(&mut self) -> Result<i8> {
        let pos = self.pos();
        self.cursor.read_be().map_err(|_| ParseError::Truncated(pos))
    }

    fn u16(&mut self) -> Result<u16> {
        let pos = self.pos();
        self.cursor.read_be().map_err(|_| ParseError::Truncated(pos))
    }

    fn i16(&mut self) -> Result<i16> {
        let pos = self.pos();
        self.cursor.read_be().map_err(|_| ParseError::Truncated(pos))
    }

    fn i32(&mut self) -> Result<i32> {
        let pos = self.pos();
        self.cursor.read_be().map_err(|_| ParseError::Truncated(pos))
    }

    fn skip_padding(&mut self) {
        let pos = self.cursor.position();
        self.cursor.set_position((pos + 3) & !3);
    }
}

fn target(addr: u32, offset: i32) -> Result<u32> {
    u32::try_from(addr as i64 + offset as i64).map_err(|_| ParseError::Truncated(addr))
}

/// Decodes one method's `code` array.
pub fn decode(code: &[u8], pool: &ConstantPool, method: &str) -> Result<Vec<Insn>> {
    let mut reader = CodeReader::new(code);
    let mut out = Vec::new();
    while !reader.at_end() {
        let addr = reader.pos();
        let opcode = reader.u8()?;
        let op = decode_one(&mut reader, pool, method, addr, opcode)?;
        out.push(Insn::new(addr, op));
    }
    Ok(out)
}

fn decode_one(
    r: &mut CodeReader<'_>,
    pool: &ConstantPool,
    method: &str,
    addr: u32,
    opcode: u8,
) -> Result<Instruction> {
    let unsupported = |name: &'static str| ParseError::UnsupportedOpcode {
        method: method.to_string(),
        name,
        offset: addr,
    };
    let op = match opcode {
        0x00 => Instruction::Nop,
        0x01 => Instruction::ConstNull,
        0x02..=0x08 => Instruction::Const(ConstantValue::Int(opcode as i32 - 3)),
        0x09 | 0x0a => Instruction::Const(ConstantValue::Long((opcode - 0x09) as i64)),
        0x0b..=0x0d => Instruction::Const(ConstantValue::Float((opcode - 0x0b) as f32)),
        0x0e | 0x0f => Instruction::Const(ConstantValue::Double((opcode - 0x0e) as f64)),
        0x10 => Instruction::Const(ConstantValue::Int(r.i8()? as i32)),
        0x11 => Instruction::Const(ConstantValue::Int(r.i16()? as i32)),
        0x12 => Instruction::Const(pool.loadable(r.u8()? as u16)?),
        0x13 | 0x14 => Instruction::Const(pool.loadable(r.u16()?)?),
        0x15..=0x19 => Instruction::Load {
            kind: KINDS[(opcode - 0x15) as usize],
            slot: r.u8()? as u16,
        },
        0x1a..=0x2d => {
            let n = opcode - 0x1a;
            Instruction::Load {
                kind: KINDS[(n / 4) as usize],
                slot: (n % 4) as u16,
            }
        }
        0x2e..=0x35 => Instruction::ArrayLoad(ELEMS[(opcode - 0x2e) as usize]),
        0x36..=0x3a => Instruction::Store {
            kind: KINDS[(opcode - 0x36) as usize],
            slot: r.u8()? as u16,
        },
        0x3b..=0x4e => {
            let n = opcode - 0x3b;
            Instruction::Store {
                kind: KINDS[(n / 4) as usize],
                slot: (n % 4) as u16,
            }
        }
        0x4f..=0x56 => Instruction::ArrayStore(ELEMS[(opcode - 0x4f) as usize]),
        0x57 => Instruction::Stack(StackOp::Pop),
        0x58 => Instruction::Stack(StackOp::Pop2),
        0x59 => Instruction::Stack(StackOp::Dup),
        0x5a => Instruction::Stack(StackOp::DupX1),
        0x5b => Instruction::Stack(StackOp::DupX2),
        0x5c => Instruction::Stack(StackOp::Dup2),
        0x5d => Instruction::Stack(StackOp::Dup2X1),
        0x5e => Instruction::Stack(StackOp::Dup2X2),
        0x5f => Instruction::Stack(StackOp::Swap),
        0x60..=0x73 => {
            let n = opcode - 0x60;
            let ops = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem];
            Instruction::Arith {
                kind: KINDS[(n % 4) as usize],
                op: ops[(n / 4) as usize],
            }
        }
        0x74..=0x77 => Instruction::Neg(KINDS[(opcode - 0x74) as usize]),
        0x78..=0x83 => {
            let n = opcode - 0x78;
            let ops = [
                ArithOp::Shl,
                ArithOp::Shr,
                ArithOp::Ushr,
                ArithOp::And,
                ArithOp::Or,
                ArithOp::Xor,
            ];
            Instruction::Arith {
                kind: KINDS[(n % 2) as usize],
                op: ops[(n / 2) as usize],
            }
        }
        0x84 => Instruction::Iinc {
            slot: r.u8()? as u16,
            delta: r.i8()? as i16,
        },
        0x85..=0x90 => {
            use ValueKind::*;
            let (from, to) = match opcode {
                0x85 => (Int, Long),
                0x86 => (Int, Float),
                0x87 => (Int, Double),
                0x88 => (Long, Int),
                0x89 => (Long, Float),
                0x8a => (Long, Double),
                0x8b => (Float, Int),
                0x8c => (Float, Long),
                0x8d => (Float, Double),
                0x8e => (Double, Int),
                0x8f => (Double, Long),
                _ => (Double, Float),
            };
            Instruction::Convert { from, to }
        }
        0x91 => Instruction::Narrow(NarrowKind::Byte),
        0x92 => Instruction::Narrow(NarrowKind::Char),
        0x93 => Instruction::Narrow(NarrowKind::Short),
        0x94 => Instruction::Compare(CompareOp {
            kind: ValueKind::Long,
            nan_result: 0,
        }),
        0x95..=0x98 => Instruction::Compare(CompareOp {
            kind: if opcode < 0x97 {
                ValueKind::Float
            } else {
                ValueKind::Double
            },
            nan_result: if opcode % 2 == 1 { -1 } else { 1 },
        }),
        0x99..=0x9e => Instruction::If {
            cond: CONDITIONS[(opcode - 0x99) as usize],
            operands: BranchOperands::IntZero,
            target: target(addr, r.i16()? as i32)?,
        },
        0x9f..=0xa4 => Instruction::If {
            cond: CONDITIONS[(opcode - 0x9f) as usize],
            operands: BranchOperands::IntPair,
            target: target(addr, r.i16()? as i32)?,
        },
        0xa5 | 0xa6 => Instruction::If {
            cond: CONDITIONS[(opcode - 0xa5) as usize],
            operands: BranchOperands::RefPair,
            target: target(addr, r.i16()? as i32)?,
        },
        0xa7 => Instruction::Goto {
            target: target(addr, r.i16()? as i32)?,
        },
        0xa8 => return Err(unsupported("jsr")),
        0xa9 => return Err(unsupported("ret")),
        0xaa => {
            r.skip_padding();
            let default = target(addr, r.i32()?)?;
            let low = r.i32()?;
            let high = r.i32()?;
            if high < low {
                return Err(ParseError::Attribute {
                    attribute: "Code".to_string(),
                    reason: format!("tableswitch at {} has high {} < low {}", addr, high, low),
                });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                targets.push(target(addr, r.i32()?)?);
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        0xab => {
            r.skip_padding();
            let default = target(addr, r.i32()?)?;
            let npairs = r.i32()?;
            if npairs < 0 {
                return Err(ParseError::Attribute {
                    attribute: "Code".to_string(),
                    reason: format!("lookupswitch at {} has {} pairs", addr, npairs),
                });
            }
            let mut pairs = Vec::with_capacity((npairs as usize).min(1 << 16));
            for _ in 0..npairs {
                let key = r.i32()?;
                pairs.push((key, target(addr, r.i32()?)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        0xac => Instruction::Return(Some(ValueKind::Int)),
        0xad => Instruction::Return(Some(ValueKind::Long)),
        0xae => Instruction::Return(Some(ValueKind::Float)),
        0xaf => Instruction::Return(Some(ValueKind::Double)),
        0xb0 => Instruction::Return(Some(ValueKind::Ref)),
        0xb1 => Instruction::Return(None),
        0xb2..=0xb5 => {
            let field = pool.member_ref(r.u16()?)?;
            let op = match opcode {
                0xb2 => FieldOp::GetStatic,
                0xb3 => FieldOp::PutStatic,
                0xb4 => FieldOp::GetField,
                _ => FieldOp::PutField,
            };
            Instruction::Field { op, field }
        }
        0xb6..=0xb8 => {
            let method = pool.member_ref(r.u16()?)?;
            let kind = match opcode {
                0xb6 => InvokeKind::Virtual,
                0xb7 => InvokeKind::Special,
                _ => InvokeKind::Static,
            };
            Instruction::Invoke { kind, method }
        }
        0xb9 => {
            let method = pool.member_ref(r.u16()?)?;
            r.u8()?;
            r.u8()?;
            Instruction::Invoke {
                kind: InvokeKind::Interface,
                method,
            }
        }
        0xba => {
            let (name, descriptor, bootstrap) = pool.invoke_dynamic(r.u16()?)?;
            r.u16()?;
            Instruction::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
            }
        }
        0xbb => Instruction::New(pool.class_name(r.u16()?)?),
        0xbc => {
            let element = match r.u8()? {
                4 => JavaType::Boolean,
                5 => JavaType::Char,
                6 => JavaType::Float,
                7 => JavaType::Double,
                8 => JavaType::Byte,
                9 => JavaType::Short,
                10 => JavaType::Int,
                11 => JavaType::Long,
                other => {
                    return Err(ParseError::Attribute {
                        attribute: "Code".to_string(),
                        reason: format!("newarray at {} has element type {}", addr, other),
                    })
                }
            };
            Instruction::NewArray(element)
        }
        0xbd => {
            let name = pool.class_name(r.u16()?)?;
            Instruction::NewArray(JavaType::from_class_constant(&name)?)
        }
        0xbe => Instruction::ArrayLength,
        0xbf => Instruction::Throw,
        0xc0 => Instruction::CheckCast(pool.class_name(r.u16()?)?),
        0xc1 => Instruction::InstanceOf(pool.class_name(r.u16()?)?),
        0xc2 => Instruction::MonitorEnter,
        0xc3 => Instruction::MonitorExit,
        WIDE => {
            let inner = r.u8()?;
            match inner {
                0x15..=0x19 => Instruction::Load {
                    kind: KINDS[(inner - 0x15) as usize],
                    slot: r.u16()?,
                },
                0x36..=0x3a => Instruction::Store {
                    kind: KINDS[(inner - 0x36) as usize],
                    slot: r.u16()?,
                },
                0x84 => Instruction::Iinc {
                    slot: r.u16()?,
                    delta: r.i16()?,
                },
                0xa9 => return Err(unsupported("ret")),
                other => {
                    return Err(ParseError::UnknownOpcode {
                        opcode: other,
                        offset: addr,
                    })
                }
            }
        }
        0xc5 => {
            let name = pool.class_name(r.u16()?)?;
            let dims = r.u8()?;
            Instruction::MultiNewArray {
                ty: JavaType::from_class_constant(&name)?,
                dims,
            }
        }
        0xc6 => Instruction::If {
            cond: Condition::Eq,
            operands: BranchOperands::Null,
            target: target(addr, r.i16()? as i32)?,
        },
        0xc7 => Instruction::If {
            cond: Condition::Ne,
            operands: BranchOperands::Null,
            target: target(addr, r.i16()? as i32)?,
        },
        0xc8 => Instruction::Goto {
            target: target(addr, r.i32()?)?,
        },
        0xc9 => return Err(unsupported("jsr_w")),
        other => {
            return Err(ParseError::UnknownOpcode {
                opcode: other,
                offset: addr,
            })
        }
    };
    Ok(op)
}
