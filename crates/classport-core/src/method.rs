use crate::instructions::{Insn, Instruction, InvokeKind, MemberRef};
use crate::types::{JavaType, MethodDescriptor};
use crate::values::ConstantValue;
use crate::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// Name plus descriptor: what virtual dispatch matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub name: String,
    pub descriptor: String,
}

impl MethodKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

impl From<&MemberRef> for MethodKey {
    fn from(member: &MemberRef) -> Self {
        MethodKey::new(&member.name, &member.descriptor)
    }
}

/// Handler range `[start, end)` with the handler offset. `catch_type == None` catches everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    pub fn covers(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Outgoing reference recorded when a method is built; never removed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyEdge {
    Type(String),
    Invoke { kind: InvokeKind, target: MemberRef },
    Field { target: MemberRef, is_static: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub signature: MethodDescriptor,
    pub flags: MethodAccessFlags,
    pub instructions: Vec<Insn>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub handlers: Vec<ExceptionHandler>,
    pub throws: Vec<String>,
    pub edges: Vec<DependencyEdge>,
    pub eliminated: bool,
}

impl MethodRecord {
    pub fn new(
        class_name: &str,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
    ) -> Result<Self> {
        let signature = MethodDescriptor::parse(descriptor)?;
        Ok(Self {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature,
            flags,
            instructions: Vec::new(),
            max_stack: 0,
            max_locals: 0,
            handlers: Vec::new(),
            throws: Vec::new(),
            edges: Vec::new(),
            eliminated: false,
        })
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(&self.name, &self.descriptor)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(MethodAccessFlags::SYNCHRONIZED)
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodAccessFlags::PRIVATE)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Participates in virtual dispatch: an instance method that is neither private nor a
    /// constructor.
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_constructor()
    }

    pub fn has_body(&self) -> bool {
        !self.is_abstract() && !self.is_native()
    }

    /// Local-variable slots taken by the receiver and the arguments.
    pub fn arg_slots(&self) -> u16 {
        self.signature.arg_slots() + if self.is_static() { 0 } else { 1 }
    }

    /// Recomputes `edges` from the signature, handler catch types and instruction stream.
    pub fn compute_edges(&mut self) {
        let mut edges = BTreeSet::new();
        let add_type = |edges: &mut BTreeSet<DependencyEdge>, ty: &JavaType| {
            if let Some(class) = ty.referenced_class() {
                edges.insert(DependencyEdge::Type(class.to_string()));
            }
        };
        for param in &self.signature.params {
            add_type(&mut edges, param);
        }
        add_type(&mut edges, &self.signature.ret);
        for handler in &self.handlers {
            if let Some(catch) = &handler.catch_type {
                edges.insert(DependencyEdge::Type(catch.clone()));
            }
        }
        for insn in &self.instructions {
            match &insn.op {
                Instruction::Invoke { kind, method } => {
                    edges.insert(DependencyEdge::Type(method.owner.clone()));
                    edges.insert(DependencyEdge::Invoke {
                        kind: *kind,
                        target: method.clone(),
                    });
                }
                Instruction::Field { op, field } => {
                    edges.insert(DependencyEdge::Type(field.owner.clone()));
                    edges.insert(DependencyEdge::Field {
                        target: field.clone(),
                        is_static: op.is_static(),
                    });
                }
                Instruction::New(class)
                | Instruction::CheckCast(class)
                | Instruction::InstanceOf(class)
                | Instruction::Const(ConstantValue::Class(class)) => {
                    if let Ok(ty) = JavaType::from_class_constant(class) {
                        add_type(&mut edges, &ty);
                    }
                }
                Instruction::NewArray(ty) | Instruction::MultiNewArray { ty, .. } => {
                    add_type(&mut edges, ty);
                }
                _ => {}
            }
        }
        self.edges = edges.into_iter().collect();
    }

    pub fn referenced_classes(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().filter_map(|edge| match edge {
            DependencyEdge::Type(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn instruction_index(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
    }
}
