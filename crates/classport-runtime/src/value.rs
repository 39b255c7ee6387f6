use crate::{Result, RuntimeError};
use classport_core::values::{ConstantValue, ValueKind};
use std::fmt;

/// Handle to a heap object. Null is `None` wherever a reference may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub u32);

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:x}", self.0)
    }
}

/// One tagged stack or local slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjRef>),
}

pub const NULL: Value = Value::Ref(None);

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl Value {
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Ref => NULL,
        }
    }

    pub fn object(obj: ObjRef) -> Self {
        Value::Ref(Some(obj))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    fn mismatch(&self, expected: ValueKind) -> RuntimeError {
        RuntimeError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Int)),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Long)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Double)),
        }
    }

    pub fn as_ref(&self) -> Result<Option<ObjRef>> {
        match self {
            Value::Ref(r) => Ok(*r),
            other => Err(other.mismatch(ValueKind::Ref)),
        }
    }

    /// The object this slot keeps alive, if any.
    pub fn reference(&self) -> Option<ObjRef> {
        match self {
            Value::Ref(r) => *r,
            _ => None,
        }
    }

    /// Numeric constants only; strings and class literals need the heap.
    pub fn from_constant(value: &ConstantValue) -> Option<Self> {
        match value {
            ConstantValue::Int(v) => Some(Value::Int(*v)),
            ConstantValue::Long(v) => Some(Value::Long(*v)),
            ConstantValue::Float(v) => Some(Value::Float(*v)),
            ConstantValue::Double(v) => Some(Value::Double(*v)),
            ConstantValue::String(_) | ConstantValue::Class(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Ref(Some(r)) => write!(f, "{}", r),
            Value::Ref(None) => write!(f, "null"),
        }
    }
}
