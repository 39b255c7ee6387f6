use crate::method::{MethodKey, MethodRecord};
use crate::types::JavaType;
use crate::values::ConstantValue;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    pub descriptor: String,
    pub ty: JavaType,
    pub flags: FieldAccessFlags,
    pub constant: Option<ConstantValue>,
    /// Classes the field structurally depends on: its declared type plus any class named in its
    /// generic signature.
    pub dependencies: BTreeSet<String>,
    pub eliminated: bool,
}

impl FieldRecord {
    pub fn new(name: &str, ty: JavaType, flags: FieldAccessFlags) -> Self {
        let mut dependencies = BTreeSet::new();
        if let Some(class) = ty.referenced_class() {
            dependencies.insert(class.to_string());
        }
        Self {
            name: name.to_string(),
            descriptor: ty.to_string(),
            ty,
            flags,
            constant: None,
            dependencies,
            eliminated: false,
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAccessFlags::STATIC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    /// `None` only for the hierarchy root.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub flags: ClassAccessFlags,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub source_file: Option<String>,
    pub major_version: u16,
    pub eliminated: bool,
}

impl ClassRecord {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            major_version: 52,
            eliminated: false,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<(usize, &MethodRecord)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name && m.descriptor == descriptor)
    }

    pub fn find_method_by_key(&self, key: &MethodKey) -> Option<(usize, &MethodRecord)> {
        self.find_method(&key.name, &key.descriptor)
    }

    pub fn find_field(&self, name: &str) -> Option<(usize, &FieldRecord)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn static_initializer(&self) -> Option<(usize, &MethodRecord)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.is_static_initializer())
    }

    pub fn has_static_initializer(&self) -> bool {
        self.static_initializer().is_some()
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldRecord> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldRecord> {
        self.fields.iter().filter(|f| f.is_static())
    }

    pub fn live_methods(&self) -> impl Iterator<Item = &MethodRecord> {
        self.methods.iter().filter(|m| !m.eliminated)
    }

    /// Supertypes named by this class, superclass first.
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }
}
