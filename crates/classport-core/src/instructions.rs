/*! Stack-machine instructions, grouped by category rather than by opcode.
 *
 * The decoder folds the ~200 opcodes into these variants; each variant carries the operand types
 * its lowering needs (value kinds for loads and stores, element types for arrays, full member
 * references for field access and invocation), so no instruction has to be re-interpreted from its
 * neighbours.
 */

use crate::types::JavaType;
use crate::values::{ConstantValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
            ArithOp::Ushr => ">>>",
            ArithOp::And => "&",
            ArithOp::Or => "|",
            ArithOp::Xor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrowKind {
    Byte,
    Char,
    Short,
}

/// `lcmp`, `fcmpl`/`fcmpg`, `dcmpl`/`dcmpg`. `nan_result` is the value produced when either
/// operand is NaN (-1 for the `l` forms, 1 for the `g` forms, unused for longs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompareOp {
    pub kind: ValueKind,
    pub nan_result: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Condition::Eq => ordering == Equal,
            Condition::Ne => ordering != Equal,
            Condition::Lt => ordering == Less,
            Condition::Ge => ordering != Less,
            Condition::Gt => ordering == Greater,
            Condition::Le => ordering != Greater,
        }
    }

    pub fn c_operator(self) -> &'static str {
        match self {
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Lt => "<",
            Condition::Ge => ">=",
            Condition::Gt => ">",
            Condition::Le => "<=",
        }
    }
}

/// What a conditional jump compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchOperands {
    /// `ifeq`..`ifle`: one int against zero.
    IntZero,
    /// `if_icmpeq`..`if_icmple`.
    IntPair,
    /// `if_acmpeq`/`if_acmpne`.
    RefPair,
    /// `ifnull`/`ifnonnull`, with `Eq`/`Ne`.
    Null,
}

impl BranchOperands {
    pub fn popped(self) -> &'static [ValueKind] {
        match self {
            BranchOperands::IntZero => &[ValueKind::Int],
            BranchOperands::IntPair => &[ValueKind::Int, ValueKind::Int],
            BranchOperands::RefPair => &[ValueKind::Ref, ValueKind::Ref],
            BranchOperands::Null => &[ValueKind::Ref],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldOp {
    GetField,
    PutField,
    GetStatic,
    PutStatic,
}

impl FieldOp {
    pub fn is_static(self) -> bool {
        matches!(self, FieldOp::GetStatic | FieldOp::PutStatic)
    }

    pub fn is_write(self) -> bool {
        matches!(self, FieldOp::PutField | FieldOp::PutStatic)
    }
}

/// Element type of an array access. Boolean and byte arrays share `Byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayElem {
    Int,
    Long,
    Float,
    Double,
    Ref,
    Byte,
    Char,
    Short,
}

impl ArrayElem {
    pub fn kind(self) -> ValueKind {
        match self {
            ArrayElem::Long => ValueKind::Long,
            ArrayElem::Float => ValueKind::Float,
            ArrayElem::Double => ValueKind::Double,
            ArrayElem::Ref => ValueKind::Ref,
            ArrayElem::Int | ArrayElem::Byte | ArrayElem::Char | ArrayElem::Short => {
                ValueKind::Int
            }
        }
    }

    pub fn size(self) -> u8 {
        match self {
            ArrayElem::Byte => 1,
            ArrayElem::Char | ArrayElem::Short => 2,
            ArrayElem::Int | ArrayElem::Float => 4,
            ArrayElem::Long | ArrayElem::Double => 8,
            ArrayElem::Ref => 0,
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            ArrayElem::Int => "JAVA_INT",
            ArrayElem::Long => "JAVA_LONG",
            ArrayElem::Float => "JAVA_FLOAT",
            ArrayElem::Double => "JAVA_DOUBLE",
            ArrayElem::Ref => "JAVA_OBJECT",
            ArrayElem::Byte => "JAVA_BYTE",
            ArrayElem::Char => "JAVA_CHAR",
            ArrayElem::Short => "JAVA_SHORT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Nop,
    Const(ConstantValue),
    ConstNull,
    Load {
        kind: ValueKind,
        slot: u16,
    },
    Store {
        kind: ValueKind,
        slot: u16,
    },
    Stack(StackOp),
    Arith {
        kind: ValueKind,
        op: ArithOp,
    },
    Neg(ValueKind),
    Convert {
        from: ValueKind,
        to: ValueKind,
    },
    Narrow(NarrowKind),
    Compare(CompareOp),
    Iinc {
        slot: u16,
        delta: i16,
    },
    Goto {
        target: u32,
    },
    If {
        cond: Condition,
        operands: BranchOperands,
        target: u32,
    },
    TableSwitch {
        default: u32,
        low: i32,
        high: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
    Field {
        op: FieldOp,
        field: MemberRef,
    },
    ArrayLoad(ArrayElem),
    ArrayStore(ArrayElem),
    ArrayLength,
    Invoke {
        kind: InvokeKind,
        method: MemberRef,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: u16,
    },
    New(String),
    NewArray(JavaType),
    MultiNewArray {
        ty: JavaType,
        dims: u8,
    },
    CheckCast(String),
    InstanceOf(String),
    Throw,
    MonitorEnter,
    MonitorExit,
    Return(Option<ValueKind>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InsnCategory {
    Stack,
    Local,
    Constant,
    Arithmetic,
    Control,
    FieldAccess,
    ArrayAccess,
    Invocation,
    Allocation,
    TypeCheck,
    Monitor,
    Throw,
    Return,
}

impl Instruction {
    pub fn category(&self) -> InsnCategory {
        match self {
            Instruction::Nop | Instruction::Stack(_) => InsnCategory::Stack,
            Instruction::Load { .. } | Instruction::Store { .. } | Instruction::Iinc { .. } => {
                InsnCategory::Local
            }
            Instruction::Const(_) | Instruction::ConstNull => InsnCategory::Constant,
            Instruction::Arith { .. }
            | Instruction::Neg(_)
            | Instruction::Convert { .. }
            | Instruction::Narrow(_)
            | Instruction::Compare(_) => InsnCategory::Arithmetic,
            Instruction::Goto { .. }
            | Instruction::If { .. }
            | Instruction::TableSwitch { .. }
            | Instruction::LookupSwitch { .. } => InsnCategory::Control,
            Instruction::Field { .. } => InsnCategory::FieldAccess,
            Instruction::ArrayLoad(_) | Instruction::ArrayStore(_) | Instruction::ArrayLength => {
                InsnCategory::ArrayAccess
            }
            Instruction::Invoke { .. } | Instruction::InvokeDynamic { .. } => {
                InsnCategory::Invocation
            }
            Instruction::New(_) | Instruction::NewArray(_) | Instruction::MultiNewArray { .. } => {
                InsnCategory::Allocation
            }
            Instruction::CheckCast(_) | Instruction::InstanceOf(_) => InsnCategory::TypeCheck,
            Instruction::MonitorEnter | Instruction::MonitorExit => InsnCategory::Monitor,
            Instruction::Throw => InsnCategory::Throw,
            Instruction::Return(_) => InsnCategory::Return,
        }
    }

    /// Explicit jump and dispatch targets, default branch included.
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Instruction::Goto { target } | Instruction::If { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all: Vec<u32> = pairs.iter().map(|(_, t)| *t).collect();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Control never falls through to the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Instruction::Goto { .. }
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::Throw
                | Instruction::Return(_)
        )
    }
}

/// One decoded instruction at its bytecode offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insn {
    pub offset: u32,
    pub op: Instruction,
}

impl Insn {
    pub fn new(offset: u32, op: Instruction) -> Self {
        Self { offset, op }
    }
}
