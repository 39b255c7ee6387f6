/*! Class, method and instruction IR for ahead-of-time classfile translation.
 *
 * Classfiles arrive as a flat directory in no particular order. This crate holds the model they are
 * decoded into, the class table that ties them together by name, the reachability culler that
 * decides what survives, and the lowering engine that turns each surviving method's stack-machine
 * bytecode into statements over an explicit, typed value stack.
 */

pub mod analysis;
pub mod builder;
pub mod class;
pub mod class_table;
pub mod codegen;
pub mod config;
pub mod instructions;
pub mod method;
pub mod types;
pub mod values;

pub use analysis::{cull, CullReport, DependencyGraph, FrameStates, Node};
pub use builder::{ClassBuilder, MethodBuilder, TableBuilder};
pub use class::{ClassAccessFlags, ClassRecord, FieldAccessFlags, FieldRecord};
pub use class_table::{ClassId, ClassTable};
pub use codegen::{lower_program, LoweredClass, LoweredMethod, LoweredProgram, Stmt};
pub use config::{BuildManifest, CullConfig, NativeSource, RuntimeConfig};
pub use instructions::{Insn, Instruction, InvokeKind, MemberRef};
pub use method::{DependencyEdge, ExceptionHandler, MethodAccessFlags, MethodKey, MethodRecord};
pub use types::{JavaType, MethodDescriptor};
pub use values::{ConstantValue, ValueKind};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Malformed classfile {class}: {reason}")]
    MalformedClassfile { class: String, reason: String },
    #[error("Dangling reference after cull in {method}: {reference} was eliminated")]
    DanglingReferenceAfterCull { method: String, reference: String },
    #[error("Linkage gap: {symbol} referenced from {referenced_from} is not defined")]
    LinkageGap {
        symbol: String,
        referenced_from: String,
    },
    #[error("Verification failed in {class}.{method} at offset {offset}: {message}")]
    Verification {
        class: String,
        method: String,
        offset: u32,
        message: String,
    },
    #[error("Unsupported instruction in {method} at offset {offset}: {instruction}")]
    UnsupportedInstruction {
        method: String,
        offset: u32,
        instruction: String,
    },
    #[error("Class not found: {0}")]
    ClassNotFound(String),
    #[error("Entry point not found: {class}.{method}")]
    EntryPointNotFound { class: String, method: String },
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Builder error: {0}")]
    BuilderError(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;

#[cfg(test)]
mod tests;
