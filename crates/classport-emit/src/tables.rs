/*! Program-wide tables whose indices are baked into generated code.
 *
 * Type descriptors (cast targets, array types, catch types, class literals and the class objects
 * static synchronized methods lock) and interned strings are numbered once per program, so a class
 * unit and the metadata unit agree on every index.
 */

use classport_core::{ConstantValue, JavaType, LoweredProgram, Stmt};
use indexmap::IndexSet;

#[derive(Debug, Clone, Default)]
pub struct SharedTables {
    types: IndexSet<JavaType>,
    strings: IndexSet<String>,
}

impl SharedTables {
    pub fn build(program: &LoweredProgram) -> Self {
        let mut tables = SharedTables {
            types: IndexSet::new(),
            strings: program.strings.iter().cloned().collect(),
        };
        for class in &program.classes {
            for field in &class.static_fields {
                if let Some(ConstantValue::String(text)) = &field.constant {
                    tables.strings.insert(text.clone());
                }
            }
            for method in &class.methods {
                for stmt in method.prologue.iter().chain(method.body.iter().map(|s| &s.stmt)) {
                    if let Some(ty) = type_operand(stmt) {
                        tables.types.insert(ty);
                    }
                }
                for catch in method.handlers.iter().filter_map(|h| h.catch_type.as_deref()) {
                    tables.types.insert(JavaType::object(catch));
                }
                if method.is_synchronized && method.is_static {
                    tables.types.insert(JavaType::object(&class.name));
                }
            }
        }
        tables
    }

    pub fn type_index(&self, ty: &JavaType) -> Option<usize> {
        self.types.get_index_of(ty)
    }

    pub fn string_index(&self, text: &str) -> Option<usize> {
        self.strings.get_index_of(text)
    }

    pub fn types(&self) -> impl Iterator<Item = &JavaType> {
        self.types.iter()
    }

    pub fn strings(&self) -> impl Iterator<Item = &String> {
        self.strings.iter()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }
}

/// The type a statement hands to the runtime, if any.
pub fn type_operand(stmt: &Stmt) -> Option<JavaType> {
    match stmt {
        Stmt::CheckCast(ty) | Stmt::InstanceOf(ty) => Some(ty.clone()),
        Stmt::NewArray(element) => Some(JavaType::array_of(element.clone(), 1)),
        Stmt::NewMultiArray { ty, .. } => Some(ty.clone()),
        Stmt::Push(ConstantValue::Class(name)) => JavaType::from_class_constant(name).ok(),
        _ => None,
    }
}

/// Element class and per-element size recorded for a type descriptor.
pub fn element_info(ty: &JavaType) -> (Option<&str>, u8, u8) {
    match ty {
        JavaType::Array { element, dims } => {
            let size = if *dims > 1 { 0 } else { element.primitive_size() };
            (element.referenced_class(), *dims, size)
        }
        other => (other.referenced_class(), 0, 0),
    }
}
