use super::MethodBuilder;
use crate::{
    class::{ClassAccessFlags, ClassRecord, FieldAccessFlags, FieldRecord},
    class_table::{ClassId, ClassTable},
    codegen::runtime_contract,
    method::MethodAccessFlags,
    types::JavaType,
    values::ConstantValue,
    Result,
};

pub struct ClassBuilder<'a> {
    record: ClassRecord,
    table: &'a mut ClassTable,
}

impl<'a> ClassBuilder<'a> {
    pub fn new(name: &str, table: &'a mut ClassTable) -> Self {
        Self {
            record: ClassRecord::new(name, Some(runtime_contract::OBJECT)),
            table,
        }
    }

    pub fn extends(&mut self, super_name: &str) -> &mut Self {
        self.record.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.record.interfaces.push(interface.to_string());
        self
    }

    pub fn interface(&mut self) -> &mut Self {
        self.record.flags = ClassAccessFlags::PUBLIC
            | ClassAccessFlags::INTERFACE
            | ClassAccessFlags::ABSTRACT;
        self
    }

    pub fn abstract_class(&mut self) -> &mut Self {
        self.record.flags |= ClassAccessFlags::ABSTRACT;
        self
    }

    pub fn field(&mut self, name: &str, descriptor: &str) -> Result<&mut Self> {
        let ty = JavaType::parse(descriptor)?;
        self.record
            .fields
            .push(FieldRecord::new(name, ty, FieldAccessFlags::PRIVATE));
        Ok(self)
    }

    pub fn static_field(&mut self, name: &str, descriptor: &str) -> Result<&mut Self> {
        let ty = JavaType::parse(descriptor)?;
        self.record.fields.push(FieldRecord::new(
            name,
            ty,
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
        ));
        Ok(self)
    }

    pub fn constant_field(&mut self, name: &str, value: ConstantValue) -> Result<&mut Self> {
        let ty = match &value {
            ConstantValue::Int(_) => JavaType::Int,
            ConstantValue::Long(_) => JavaType::Long,
            ConstantValue::Float(_) => JavaType::Float,
            ConstantValue::Double(_) => JavaType::Double,
            ConstantValue::String(_) => JavaType::object(runtime_contract::STRING),
            ConstantValue::Class(_) => JavaType::object("java/lang/Class"),
        };
        let mut field = FieldRecord::new(
            name,
            ty,
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        );
        field.constant = Some(value);
        self.record.fields.push(field);
        Ok(self)
    }

    /// Records an extra structural dependency on the most recently added field, as a generic
    /// signature would.
    pub fn field_dependency(&mut self, class: &str) -> &mut Self {
        if let Some(field) = self.record.fields.last_mut() {
            field.dependencies.insert(class.to_string());
        }
        self
    }

    pub fn method(&mut self, name: &str, descriptor: &str) -> MethodBuilder<'_> {
        self.method_with_flags(name, descriptor, MethodAccessFlags::PUBLIC)
    }

    pub fn static_method(&mut self, name: &str, descriptor: &str) -> MethodBuilder<'_> {
        self.method_with_flags(
            name,
            descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
    }

    pub fn abstract_method(&mut self, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.method_with_flags(
            name,
            descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        )
        .build()?;
        Ok(self)
    }

    pub fn native_method(&mut self, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.method_with_flags(
            name,
            descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
        )
        .build()?;
        Ok(self)
    }

    /// Adds `<init>()V` that only chains to the superclass constructor.
    pub fn default_constructor(&mut self) -> Result<&mut Self> {
        let super_name = self
            .record
            .super_name
            .clone()
            .unwrap_or_else(|| runtime_contract::OBJECT.to_string());
        let mut ctor = self.method("<init>", "()V");
        ctor.aload(0)
            .invoke_special(&super_name, "<init>", "()V")
            .return_void();
        ctor.build()?;
        Ok(self)
    }

    pub fn method_with_flags(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
    ) -> MethodBuilder<'_> {
        let class_name = self.record.name.clone();
        MethodBuilder::new(&class_name, name, descriptor, flags, &mut self.record.methods)
    }

    pub fn build(self) -> Result<ClassId> {
        let (id, _) = self.table.insert(self.record);
        Ok(id)
    }
}
