/*! The process-wide class table, passed explicitly through every stage.
 *
 * Parsing populates it, culling annotates it, lowering and emission only read it. Classes refer to
 * one another by name and are addressed by stable index, so reference cycles between classes are
 * plain entries rather than ownership problems.
 */

use crate::class::{ClassRecord, FieldRecord};
use crate::codegen::runtime_contract;
use crate::method::{MethodKey, MethodRecord};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClassTable {
    classes: IndexMap<String, ClassRecord>,
    /// Direct subtypes (subclasses and implementors) by table index, filled by `resolve_hierarchy`.
    subtypes: Vec<Vec<ClassId>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class. A class of the same name is replaced in place and returned; its index
    /// is kept so earlier `ClassId`s stay valid.
    pub fn insert(&mut self, record: ClassRecord) -> (ClassId, Option<ClassRecord>) {
        let (index, previous) = self.classes.insert_full(record.name.clone(), record);
        if let Some(old) = &previous {
            debug!(class = %old.name, "replacing previously parsed class");
        }
        self.subtypes.clear();
        (ClassId(index as u32), previous)
    }

    /// Removes a class, shifting later indices. Invalidates outstanding `ClassId`s.
    pub fn remove(&mut self, name: &str) -> Option<ClassRecord> {
        self.subtypes.clear();
        self.classes.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassRecord> {
        self.classes.get_mut(name)
    }

    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.classes.get_index_of(name).map(|i| ClassId(i as u32))
    }

    pub fn by_id(&self, id: ClassId) -> &ClassRecord {
        &self.classes[id.index()]
    }

    pub fn by_id_mut(&mut self, id: ClassId) -> &mut ClassRecord {
        &mut self.classes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassRecord)> {
        self.classes
            .values()
            .enumerate()
            .map(|(i, c)| (ClassId(i as u32), c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClassRecord> {
        self.classes.values_mut()
    }

    pub fn live_classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.classes.values().filter(|c| !c.eliminated)
    }

    /// Links every class to its supertypes by index. Missing supertypes that the runtime does
    /// not provide are returned as warnings rather than failing the build.
    pub fn resolve_hierarchy(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut subtypes = vec![Vec::new(); self.classes.len()];
        for (index, class) in self.classes.values().enumerate() {
            for supertype in class.supertypes() {
                match self.classes.get_index_of(supertype) {
                    Some(parent) => subtypes[parent].push(ClassId(index as u32)),
                    None if runtime_contract::is_runtime_class(supertype) => {}
                    None => {
                        warn!(class = %class.name, supertype, "supertype not found");
                        warnings.push(format!(
                            "{}: supertype {} not found",
                            class.name, supertype
                        ));
                    }
                }
            }
        }
        self.subtypes = subtypes;
        warnings
    }

    fn ensure_resolved(&self) -> Option<&Vec<Vec<ClassId>>> {
        if self.subtypes.len() == self.classes.len() {
            Some(&self.subtypes)
        } else {
            None
        }
    }

    /// Direct subclasses and implementors of `id`. Empty until `resolve_hierarchy` has run.
    pub fn direct_subtypes(&self, id: ClassId) -> &[ClassId] {
        self.ensure_resolved()
            .and_then(|s| s.get(id.index()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn superclass_of<'a>(&'a self, name: &str) -> Option<&'a str> {
        match self.classes.get(name) {
            Some(class) => class.super_name.as_deref(),
            None => runtime_contract::runtime_class(name).and_then(|c| c.super_name),
        }
    }

    pub fn interfaces_of<'a>(&'a self, name: &str) -> Vec<&'a str> {
        match self.classes.get(name) {
            Some(class) => class.interfaces.iter().map(String::as_str).collect(),
            None => runtime_contract::runtime_class(name)
                .map(|c| c.interfaces.to_vec())
                .unwrap_or_default(),
        }
    }

    pub fn is_interface(&self, name: &str) -> bool {
        match self.classes.get(name) {
            Some(class) => class.is_interface(),
            None => runtime_contract::runtime_class(name)
                .map(|c| c.is_interface)
                .unwrap_or(false),
        }
    }

    /// Known either to the table or to the runtime.
    pub fn is_known(&self, name: &str) -> bool {
        self.contains(name) || runtime_contract::is_runtime_class(name)
    }

    /// Reflexive, transitive subtype test over classes and interfaces.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == runtime_contract::OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![sub];
        while let Some(current) = stack.pop() {
            if current == sup {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parent) = self.superclass_of(current) {
                stack.push(parent);
            }
            stack.extend(self.interfaces_of(current));
        }
        false
    }

    /// Superclass chain starting at `name` itself.
    pub fn superclass_chain<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![name];
        let mut current = name;
        while let Some(parent) = self.superclass_of(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Finds the declaration a reference to `owner.name descriptor` binds to: up the superclass
    /// chain first, then through superinterfaces for default and abstract methods.
    pub fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(ClassId, usize)> {
        for class_name in self.superclass_chain(owner) {
            if let Some(class) = self.classes.get(class_name) {
                if let Some((index, _)) = class.find_method(name, descriptor) {
                    return self.id_of(class_name).map(|id| (id, index));
                }
            }
        }
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self
            .superclass_chain(owner)
            .into_iter()
            .flat_map(|c| self.interfaces_of(c))
            .collect();
        while let Some(interface) = stack.pop() {
            if !seen.insert(interface) {
                continue;
            }
            if let Some(class) = self.classes.get(interface) {
                if let Some((index, _)) = class.find_method(name, descriptor) {
                    return self.id_of(interface).map(|id| (id, index));
                }
            }
            stack.extend(self.interfaces_of(interface));
        }
        None
    }

    pub fn resolve_method_record(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&MethodRecord> {
        self.resolve_method(owner, name, descriptor)
            .map(|(id, index)| &self.by_id(id).methods[index])
    }

    /// Nearest implementation of `key` visible from `class`, used for vtable filling.
    pub fn resolve_virtual(&self, class: &str, key: &MethodKey) -> Option<&MethodRecord> {
        self.resolve_method_record(class, &key.name, &key.descriptor)
    }

    pub fn resolve_field(&self, owner: &str, name: &str) -> Option<(ClassId, usize)> {
        let mut seen = HashSet::new();
        let mut stack = vec![owner];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(class) = self.classes.get(current) {
                if let Some((index, _)) = class.find_field(name) {
                    return self.id_of(current).map(|id| (id, index));
                }
            }
            stack.extend(self.interfaces_of(current));
            if let Some(parent) = self.superclass_of(current) {
                stack.push(parent);
            }
        }
        None
    }

    pub fn resolve_field_record(&self, owner: &str, name: &str) -> Option<&FieldRecord> {
        self.resolve_field(owner, name)
            .map(|(id, index)| &self.by_id(id).fields[index])
    }

    pub fn method_count(&self) -> usize {
        self.classes.values().map(|c| c.methods.len()).sum()
    }

    /// Clears every `eliminated` flag, returning the table to its freshly parsed state.
    pub fn reset_liveness(&mut self) {
        for class in self.classes.values_mut() {
            class.eliminated = false;
            for method in &mut class.methods {
                method.eliminated = false;
            }
            for field in &mut class.fields {
                field.eliminated = false;
            }
        }
    }
}
