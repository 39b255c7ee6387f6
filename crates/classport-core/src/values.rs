use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of one operand-stack entry. Narrow integral types are widened to `Int` on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

impl ValueKind {
    /// Long and double values occupy two slots (category 2).
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    pub fn slot_width(self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            ValueKind::Int => "JAVA_INT",
            ValueKind::Long => "JAVA_LONG",
            ValueKind::Float => "JAVA_FLOAT",
            ValueKind::Double => "JAVA_DOUBLE",
            ValueKind::Ref => "JAVA_OBJECT",
        }
    }

    /// Union member of the C stack slot holding this kind.
    pub fn slot_member(self) -> &'static str {
        match self {
            ValueKind::Int => "i",
            ValueKind::Long => "l",
            ValueKind::Float => "f",
            ValueKind::Double => "d",
            ValueKind::Ref => "o",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Ref => "ref",
        };
        write!(f, "{}", name)
    }
}

/// Compile-time constant, from `ldc`-family instructions or a `ConstantValue` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, by internal name or array descriptor.
    Class(String),
}

impl ConstantValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConstantValue::Int(_) => ValueKind::Int,
            ConstantValue::Long(_) => ValueKind::Long,
            ConstantValue::Float(_) => ValueKind::Float,
            ConstantValue::Double(_) => ValueKind::Double,
            ConstantValue::String(_) | ConstantValue::Class(_) => ValueKind::Ref,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Long(v) => write!(f, "{}L", v),
            ConstantValue::Float(v) => write!(f, "{}f", v),
            ConstantValue::Double(v) => write!(f, "{}d", v),
            ConstantValue::String(s) => write!(f, "{:?}", s),
            ConstantValue::Class(c) => write!(f, "{}.class", c),
        }
    }
}
