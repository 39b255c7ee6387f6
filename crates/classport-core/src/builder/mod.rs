/*! Fluent API for assembling class tables without going through binary classfiles.
 *
 * Tests and tools often need a handful of classes with a few methods each. These builders take care
 * of offsets, label resolution, local-slot sizing and dependency edges, so a method body reads like
 * the bytecode listing it stands for.
 */

pub mod class_builder;
pub mod method_builder;

pub use class_builder::ClassBuilder;
pub use method_builder::MethodBuilder;

use crate::class_table::ClassTable;

#[derive(Debug, Default)]
pub struct TableBuilder {
    table: ClassTable,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a class extending `java/lang/Object`.
    pub fn class(&mut self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder::new(name, &mut self.table)
    }

    pub fn table(&self) -> &ClassTable {
        &self.table
    }

    pub fn finish(mut self) -> ClassTable {
        self.table.resolve_hierarchy();
        self.table
    }
}
