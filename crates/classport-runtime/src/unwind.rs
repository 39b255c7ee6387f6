//! Faults, thrown objects and the result type that carries them up the executor.

use crate::value::ObjRef;
use crate::RuntimeError;
use classport_core::codegen::runtime_contract as rc;
use std::fmt;

/// A condition the runtime turns into a throwable of a fixed class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    NullPointer,
    ArrayIndexOutOfBounds { index: i32, length: u32 },
    NegativeArraySize(i32),
    DivideByZero,
    ClassCast { from: String, to: String },
    IllegalMonitorState,
    StackOverflow,
    Interrupted,
    AbstractMethod(String),
    IllegalArgument(String),
}

impl Fault {
    pub fn class_name(&self) -> &'static str {
        match self {
            Fault::NullPointer => rc::NULL_POINTER_EXCEPTION,
            Fault::ArrayIndexOutOfBounds { .. } => rc::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
            Fault::NegativeArraySize(_) => rc::NEGATIVE_ARRAY_SIZE_EXCEPTION,
            Fault::DivideByZero => rc::ARITHMETIC_EXCEPTION,
            Fault::ClassCast { .. } => rc::CLASS_CAST_EXCEPTION,
            Fault::IllegalMonitorState => rc::ILLEGAL_MONITOR_STATE_EXCEPTION,
            Fault::StackOverflow => rc::STACK_OVERFLOW_ERROR,
            Fault::Interrupted => rc::INTERRUPTED_EXCEPTION,
            Fault::AbstractMethod(_) => rc::ABSTRACT_METHOD_ERROR,
            Fault::IllegalArgument(_) => rc::ILLEGAL_ARGUMENT_EXCEPTION,
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Fault::ArrayIndexOutOfBounds { index, length } => Some(format!(
                "Index {} out of bounds for length {}",
                index, length
            )),
            Fault::NegativeArraySize(size) => Some(size.to_string()),
            Fault::AbstractMethod(method) => Some(method.replace('/', ".")),
            Fault::IllegalArgument(message) => Some(message.clone()),
            Fault::DivideByZero => Some("/ by zero".to_string()),
            Fault::ClassCast { from, to } => Some(format!(
                "class {} cannot be cast to class {}",
                from.replace('/', "."),
                to.replace('/', ".")
            )),
            Fault::NullPointer
            | Fault::IllegalMonitorState
            | Fault::StackOverflow
            | Fault::Interrupted => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {}", self.class_name(), message),
            None => write!(f, "{}", self.class_name()),
        }
    }
}

/// Why a statement did not complete normally.
#[derive(Debug)]
pub enum Unwind {
    /// Not yet materialised as an object; the executor allocates the throwable.
    Fault(Fault),
    Thrown(ObjRef),
    /// Host-level failure, never catchable by translated code.
    Fatal(RuntimeError),
}

pub type Flow<T> = std::result::Result<T, Unwind>;

impl From<Fault> for Unwind {
    fn from(fault: Fault) -> Self {
        Unwind::Fault(fault)
    }
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Self {
        Unwind::Fatal(error)
    }
}
