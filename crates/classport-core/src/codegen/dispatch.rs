/*! Virtual and interface dispatch tables.
 *
 * Every live class gets a vtable laid out prefix-compatibly with its superclass: inherited slots
 * keep their index, overrides replace the entry in place and new virtual methods are appended.
 * Interface methods a class picks up (declared abstract or as defaults) are appended after the
 * class's own methods, so an interface call can be answered by a key lookup that lands on a slot.
 * Runtime classes contribute their virtual methods first, which makes `toString` and friends
 * occupy the same slots everywhere.
 */

use crate::class_table::ClassTable;
use crate::codegen::{mangle, runtime_contract};
use crate::method::MethodKey;
use crate::types::MethodDescriptor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VTableEntry {
    pub key: MethodKey,
    pub declaring_class: String,
    /// `None` while the method is abstract for this class.
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDispatch {
    pub class: String,
    /// Dense runtime id, stable for one program.
    pub class_id: u32,
    pub super_name: Option<String>,
    pub is_interface: bool,
    pub is_runtime: bool,
    /// Every interface implemented, directly or inherited.
    pub interfaces: Vec<String>,
    pub vtable: Vec<VTableEntry>,
    slots: HashMap<MethodKey, u32>,
}

impl ClassDispatch {
    pub fn slot_of(&self, key: &MethodKey) -> Option<u32> {
        self.slots.get(key).copied()
    }

    pub fn entry(&self, slot: u32) -> Option<&VTableEntry> {
        self.vtable.get(slot as usize)
    }

    fn set(&mut self, entry: VTableEntry) {
        match self.slots.get(&entry.key) {
            Some(&slot) => self.vtable[slot as usize] = entry,
            None => {
                self.slots.insert(entry.key.clone(), self.vtable.len() as u32);
                self.vtable.push(entry);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchTables {
    classes: IndexMap<String, ClassDispatch>,
}

impl DispatchTables {
    /// Builds tables for every runtime class not shadowed by the input, then every live class.
    pub fn build(table: &ClassTable) -> Self {
        let mut tables = DispatchTables::default();
        let mut visiting = HashSet::new();
        for runtime in runtime_contract::RUNTIME_CLASSES {
            if table.get(runtime.name).map_or(true, |c| c.eliminated) {
                tables.ensure(table, runtime.name, &mut visiting);
            }
        }
        for class in table.live_classes() {
            tables.ensure(table, &class.name, &mut visiting);
        }
        tables
    }

    fn ensure(&mut self, table: &ClassTable, name: &str, visiting: &mut HashSet<String>) {
        if self.classes.contains_key(name) || !visiting.insert(name.to_string()) {
            return;
        }
        let live = table.get(name).filter(|c| !c.eliminated);
        let runtime = runtime_contract::runtime_class(name).filter(|_| live.is_none());
        if live.is_none() && runtime.is_none() {
            return;
        }

        let super_name = table.superclass_of(name).map(str::to_string);
        if let Some(parent) = &super_name {
            self.ensure(table, parent, visiting);
        }
        let mut dispatch = match super_name.as_deref().and_then(|p| self.classes.get(p)) {
            Some(parent) => ClassDispatch {
                class: name.to_string(),
                class_id: 0,
                super_name: super_name.clone(),
                is_interface: false,
                is_runtime: false,
                interfaces: parent.interfaces.clone(),
                vtable: parent.vtable.clone(),
                slots: parent.slots.clone(),
            },
            None => ClassDispatch {
                class: name.to_string(),
                class_id: 0,
                super_name: super_name.clone(),
                is_interface: false,
                is_runtime: false,
                interfaces: Vec::new(),
                vtable: Vec::new(),
                slots: HashMap::new(),
            },
        };
        dispatch.is_interface = table.is_interface(name);
        dispatch.is_runtime = runtime.is_some();

        if let Some(runtime) = runtime {
            for method in runtime_contract::virtual_methods(runtime.name) {
                let symbol = MethodDescriptor::parse(method.descriptor)
                    .ok()
                    .map(|d| mangle::method_symbol(method.class, method.name, &d));
                dispatch.set(VTableEntry {
                    key: MethodKey::new(method.name, method.descriptor),
                    declaring_class: runtime.name.to_string(),
                    symbol,
                });
            }
        }
        if let Some(class) = live {
            for method in class.live_methods().filter(|m| m.is_virtual()) {
                let symbol = (!method.is_abstract())
                    .then(|| mangle::method_symbol(&class.name, &method.name, &method.signature));
                dispatch.set(VTableEntry {
                    key: method.key(),
                    declaring_class: class.name.clone(),
                    symbol,
                });
            }
        }

        for interface in all_interfaces(table, name) {
            if !dispatch.interfaces.contains(&interface) {
                dispatch.interfaces.push(interface.clone());
            }
            self.ensure(table, &interface, visiting);
            let Some(methods) = self.classes.get(&interface).map(|i| i.vtable.clone()) else {
                continue;
            };
            for entry in methods {
                let existing = dispatch
                    .slot_of(&entry.key)
                    .and_then(|slot| dispatch.entry(slot));
                let fill = match existing {
                    None => true,
                    Some(current) => current.symbol.is_none() && entry.symbol.is_some(),
                };
                if fill {
                    dispatch.set(entry);
                }
            }
        }

        dispatch.class_id = self.classes.len() as u32;
        self.classes.insert(name.to_string(), dispatch);
    }

    pub fn get(&self, class: &str) -> Option<&ClassDispatch> {
        self.classes.get(class)
    }

    pub fn class_id(&self, class: &str) -> Option<u32> {
        self.get(class).map(|c| c.class_id)
    }

    pub fn slot_of(&self, class: &str, key: &MethodKey) -> Option<u32> {
        self.get(class)?.slot_of(key)
    }

    /// The implementation `class` runs for `key`, if it has a concrete one.
    pub fn lookup(&self, class: &str, key: &MethodKey) -> Option<&str> {
        let dispatch = self.get(class)?;
        let slot = dispatch.slot_of(key)?;
        dispatch.entry(slot)?.symbol.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDispatch> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Interfaces `name` implements, through its own declarations and superinterfaces.
fn all_interfaces(table: &ClassTable, name: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    let mut stack: Vec<&str> = table.interfaces_of(name);
    stack.reverse();
    while let Some(interface) = stack.pop() {
        if !seen.insert(interface) {
            continue;
        }
        result.push(interface.to_string());
        let mut parents = table.interfaces_of(interface);
        parents.reverse();
        stack.extend(parents);
    }
    result
}
