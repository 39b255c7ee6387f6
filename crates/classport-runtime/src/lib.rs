/*! Runtime contract for translated programs, with a reference executor.
 *
 * Generated C code leans on a small set of runtime services: a tagged heap with per-element-size
 * arrays, reentrant object monitors with wait/notify, per-thread state holding the call-depth
 * counter, the value-stack window and the pending-allocation roots, and an unwinding protocol that
 * turns faults into catchable throwables. This crate implements those services and an executor
 * that runs [`LoweredProgram`](classport_core::LoweredProgram) statements against them, so the
 * contract can be exercised without a C toolchain.
 *
 * Collection is stop-the-world: mutator threads hold the world lock only while running a slice of
 * statements and drop it before any blocking operation.
 */

pub mod heap;
pub mod interp;
pub mod monitor;
pub mod natives;
pub mod program;
pub mod runtime;
pub mod state;
pub mod threads;
pub mod unwind;
pub mod value;

pub use heap::{ArrayData, Heap, HeapObject, ObjectBody, TypeDescriptor};
pub use interp::{Executor, Outcome};
pub use monitor::MonitorTable;
pub use natives::{NativeCall, NativeFn};
pub use program::{Builtin, ClassInfo, FieldSlot, Program};
pub use runtime::{Runtime, RuntimeStats};
pub use state::ThreadState;
pub use threads::ThreadContext;
pub use unwind::{Fault, Flow, Unwind};
pub use value::{ObjRef, Value};

use classport_core::ValueKind;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },
    #[error("Operand stack underflow in {0}")]
    StackUnderflow(String),
    #[error("Value-stack window of {0} slots exhausted")]
    StackWindowExhausted(usize),
    #[error("Dangling object reference {0}")]
    DanglingObject(ObjRef),
    #[error("Object {obj} is not {expected}")]
    WrongObjectKind { obj: ObjRef, expected: &'static str },
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    #[error("Unknown field {class}.{field}")]
    UnknownField { class: String, field: String },
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),
    #[error("No implementation registered for native method {0}")]
    MissingNative(String),
    #[error("Abstract method invoked: {0}")]
    AbstractMethod(String),
    #[error("Monitor table full ({0} entries)")]
    MonitorTableFull(usize),
    #[error("Pending-allocation window full ({0} entries)")]
    PendingWindowFull(usize),
    #[error("Thread has no active frame")]
    NoFrame,
    #[error("Execution ran past the last statement of {0}")]
    FellOffEnd(String),
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Locks a runtime mutex. A panicking thread never leaves runtime tables half-updated, so a
/// poisoned lock is taken over as is.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
