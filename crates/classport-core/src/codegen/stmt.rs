/*! Lowered statements: the target-independent output of instruction lowering.
 *
 * Each statement manipulates an explicit value stack of tagged slots plus numbered local slots.
 * Every stack-width question has already been answered (a `Dup` knows how many entries it copies),
 * every call knows how it dispatches, and every field access names its declaring class, so the C
 * emitter and the reference executor can both consume statements without looking back at the
 * class table.
 */

use crate::instructions::{ArithOp, ArrayElem, BranchOperands, CompareOp, Condition, NarrowKind};
use crate::method::MethodKey;
use crate::types::JavaType;
use crate::values::{ConstantValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTarget {
    /// Declaring class after resolution up the hierarchy.
    pub owner: String,
    pub name: String,
    pub ty: JavaType,
    /// C symbol of the storage, for static fields.
    pub symbol: Option<String>,
}

impl FieldTarget {
    pub fn kind(&self) -> ValueKind {
        self.ty.value_kind().unwrap_or(ValueKind::Int)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dispatch {
    /// Static, special, private, final or devirtualised calls.
    Direct { symbol: String },
    /// Index into the receiver class's vtable.
    Virtual { slot: u32 },
    /// Key lookup in the receiver class's interface table.
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub dispatch: Dispatch,
    /// Static type named at the call site.
    pub owner: String,
    pub key: MethodKey,
    pub params: Vec<ValueKind>,
    pub ret: Option<ValueKind>,
    pub has_receiver: bool,
}

impl Call {
    /// Stack entries consumed, receiver included.
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_receiver)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Runs the named class's static initializer if it has not started yet.
    ClassInit(String),
    /// Acquires the monitor of `this` (or of the class object for static methods).
    MethodMonitorEnter,
    MethodMonitorExit,
    Push(ConstantValue),
    PushNull,
    Load {
        slot: u16,
        kind: ValueKind,
    },
    Store {
        slot: u16,
        kind: ValueKind,
    },
    Pop(u8),
    Dup {
        count: u8,
        depth: u8,
    },
    Swap,
    Binary {
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
    /// `locals[slot] += delta` on an int local, in one step.
    IncLocal {
        slot: u16,
        delta: i32,
    },
    Goto(u32),
    Branch {
        cond: Condition,
        operands: BranchOperands,
        target: u32,
    },
    /// Multi-way dispatch; keys are kept exactly as decoded, negative and sparse ones included.
    Switch {
        cases: Vec<(i32, u32)>,
        default: u32,
    },
    GetField(FieldTarget),
    PutField(FieldTarget),
    GetStatic(FieldTarget),
    PutStatic(FieldTarget),
    ArrayLoad(ArrayElem),
    ArrayStore(ArrayElem),
    ArrayLength,
    /// Allocation only; the constructor runs as a separate `Invoke`.
    New(String),
    NewArray(JavaType),
    NewMultiArray {
        ty: JavaType,
        dims: u8,
    },
    Invoke(Call),
    MonitorEnter,
    MonitorExit,
    Throw,
    Return(Option<ValueKind>),
    CheckCast(JavaType),
    InstanceOf(JavaType),
}

impl Stmt {
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Stmt::Goto(_) | Stmt::Branch { .. } | Stmt::Switch { .. }
        )
    }
}

/// A statement tagged with the bytecode offset it came from, used for handler-range matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredStmt {
    pub offset: u32,
    pub stmt: Stmt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoweredHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub catch_type: Option<String>,
}

impl LoweredHandler {
    pub fn covers(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredMethod {
    pub class: String,
    pub name: String,
    pub descriptor: String,
    pub symbol: String,
    pub is_static: bool,
    pub is_synchronized: bool,
    pub is_native: bool,
    pub is_abstract: bool,
    pub params: Vec<ValueKind>,
    pub ret: Option<ValueKind>,
    pub max_stack: u16,
    pub max_locals: u16,
    /// Runs once on entry, after the depth check; never a jump target.
    pub prologue: Vec<Stmt>,
    pub body: Vec<LoweredStmt>,
    pub handlers: Vec<LoweredHandler>,
    /// Offsets some jump, dispatch or handler lands on.
    pub jump_targets: BTreeSet<u32>,
    pub referenced_symbols: BTreeSet<String>,
}

impl LoweredMethod {
    pub fn has_body(&self) -> bool {
        !self.is_native && !self.is_abstract
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class, self.name, self.descriptor)
    }

    /// Index of the first statement lowered from `offset`.
    pub fn stmt_index(&self, offset: u32) -> Option<usize> {
        let index = self.body.partition_point(|s| s.offset < offset);
        (self.body.get(index)?.offset == offset).then_some(index)
    }

    pub fn count_stmts(&self, pred: impl Fn(&Stmt) -> bool) -> usize {
        self.body.iter().filter(|s| pred(&s.stmt)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticField {
    pub name: String,
    pub ty: JavaType,
    pub symbol: String,
    pub constant: Option<ConstantValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredClass {
    pub name: String,
    pub symbol: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// Declared instance fields, own class only.
    pub instance_fields: Vec<(String, JavaType)>,
    pub static_fields: Vec<StaticField>,
    pub methods: Vec<LoweredMethod>,
    pub clinit_symbol: Option<String>,
}

impl LoweredClass {
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&LoweredMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}
