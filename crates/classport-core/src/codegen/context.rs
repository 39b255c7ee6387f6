//! Shared state while lowering one program: resolution helpers and the string pool.

use super::dispatch::DispatchTables;
use super::{mangle, runtime_contract};
use crate::class::FieldRecord;
use crate::class_table::ClassTable;
use crate::instructions::MemberRef;
use crate::method::MethodRecord;
use crate::types::MethodDescriptor;
use crate::{Result, TranslateError};
use indexmap::IndexSet;
use std::collections::BTreeSet;

/// Where a method reference binds.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodTarget<'t> {
    Table(&'t MethodRecord),
    Runtime(runtime_contract::RuntimeMethod),
    /// Nothing provides it; the mangled symbol is still emitted and linkage reports the gap.
    Missing,
}

pub struct LoweringContext<'t> {
    pub table: &'t ClassTable,
    pub dispatch: &'t DispatchTables,
    pub effectively_final: &'t BTreeSet<String>,
    pub strings: IndexSet<String>,
    /// Method being lowered, for error reporting.
    pub current: String,
}

impl<'t> LoweringContext<'t> {
    pub fn new(
        table: &'t ClassTable,
        dispatch: &'t DispatchTables,
        effectively_final: &'t BTreeSet<String>,
    ) -> Self {
        Self {
            table,
            dispatch,
            effectively_final,
            strings: IndexSet::new(),
            current: String::new(),
        }
    }

    pub fn intern(&mut self, value: &str) -> usize {
        self.strings.insert_full(value.to_string()).0
    }

    fn dangling(&self, reference: String) -> TranslateError {
        TranslateError::DanglingReferenceAfterCull {
            method: self.current.clone(),
            reference,
        }
    }

    /// Fails if `class` is in the input but was culled.
    pub fn check_class(&self, class: &str) -> Result<()> {
        match self.table.get(class) {
            Some(record) if record.eliminated => Err(self.dangling(class.to_string())),
            _ => Ok(()),
        }
    }

    pub fn class_has_initializer(&self, class: &str) -> bool {
        self.table
            .get(class)
            .map(|c| c.has_static_initializer())
            .unwrap_or(false)
    }

    pub fn resolve_method(&self, member: &MemberRef) -> Result<MethodTarget<'t>> {
        self.check_class(&member.owner)?;
        let table = self.table;
        if let Some(record) =
            table.resolve_method_record(&member.owner, &member.name, &member.descriptor)
        {
            if record.eliminated {
                return Err(self.dangling(record.qualified_name()));
            }
            return Ok(MethodTarget::Table(record));
        }
        for class in table.superclass_chain(&member.owner) {
            if let Some(method) =
                runtime_contract::runtime_method(class, &member.name, &member.descriptor)
            {
                return Ok(MethodTarget::Runtime(method));
            }
        }
        for interface in table.interfaces_of(&member.owner) {
            if let Some(method) =
                runtime_contract::runtime_method(interface, &member.name, &member.descriptor)
            {
                return Ok(MethodTarget::Runtime(method));
            }
        }
        Ok(MethodTarget::Missing)
    }

    /// C symbol of the body a direct call to `member` runs.
    pub fn direct_symbol(&self, member: &MemberRef, target: &MethodTarget<'_>) -> Result<String> {
        match target {
            MethodTarget::Table(record) => Ok(mangle::method_symbol(
                &record.class_name,
                &record.name,
                &record.signature,
            )),
            MethodTarget::Runtime(method) => {
                let descriptor = MethodDescriptor::parse(method.descriptor)?;
                Ok(mangle::method_symbol(method.class, method.name, &descriptor))
            }
            MethodTarget::Missing => mangle::member_symbol(member),
        }
    }

    /// Resolves a field reference to its declaring class, failing on culled declarations.
    pub fn resolve_field(&self, member: &MemberRef) -> Result<(String, Option<&'t FieldRecord>)> {
        self.check_class(&member.owner)?;
        let table = self.table;
        match table.resolve_field(&member.owner, &member.name) {
            Some((id, index)) => {
                let class = table.by_id(id);
                let field = &class.fields[index];
                if field.eliminated {
                    return Err(self.dangling(format!("{}.{}", class.name, field.name)));
                }
                Ok((class.name.clone(), Some(field)))
            }
            None => Ok((member.owner.clone(), None)),
        }
    }
}
