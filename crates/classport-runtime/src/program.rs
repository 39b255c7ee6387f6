/*! Executable view of a lowered program.
 *
 * Flattens instance layouts (inherited fields first, so a field keeps its index in every
 * subclass), indexes methods by symbol and binds the symbols of runtime methods to built-in
 * implementations. Runtime classes the input does not define are added from the runtime contract.
 */

use crate::heap::TypeDescriptor;
use classport_core::codegen::runtime_contract::{self as rc, RuntimeClass};
use classport_core::codegen::{mangle, DispatchTables, LoweredMethod, StaticField};
use classport_core::{JavaType, LoweredProgram, MethodDescriptor};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub owner: String,
    pub name: String,
    pub ty: JavaType,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub super_name: Option<String>,
    /// Directly declared interfaces.
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub fields: Vec<FieldSlot>,
    pub clinit: Option<String>,
    pub descriptor: TypeDescriptor,
}

impl ClassInfo {
    pub fn field_index(&self, owner: &str, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.owner == owner && f.name == name)
    }
}

/// Runtime methods implemented by the executor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    ObjectInit,
    Equals,
    HashCode,
    ToString,
    Wait,
    WaitTimed,
    Notify,
    NotifyAll,
    StringLength,
    RunnableRun,
    ThreadInit,
    ThreadInitTarget,
    ThreadRun,
    ThreadStart,
    ThreadJoin,
    ThreadInterrupt,
    ThreadIsInterrupted,
    ThreadSleep,
    ThreadInterrupted,
    CurrentThread,
    SystemGc,
    GetMessage,
    ThrowableInit,
    ThrowableInitMessage,
}

impl Builtin {
    fn for_method(class: &str, name: &str, descriptor: &str) -> Option<Self> {
        let builtin = match (class, name, descriptor) {
            (rc::OBJECT, "<init>", "()V") => Builtin::ObjectInit,
            (rc::OBJECT, "equals", _) => Builtin::Equals,
            (rc::OBJECT, "hashCode", _) => Builtin::HashCode,
            (rc::OBJECT, "toString", _) => Builtin::ToString,
            (rc::OBJECT, "wait", "()V") => Builtin::Wait,
            (rc::OBJECT, "wait", "(J)V") => Builtin::WaitTimed,
            (rc::OBJECT, "notify", _) => Builtin::Notify,
            (rc::OBJECT, "notifyAll", _) => Builtin::NotifyAll,
            (rc::STRING, "length", _) => Builtin::StringLength,
            (rc::RUNNABLE, "run", _) => Builtin::RunnableRun,
            (rc::THREAD, "<init>", "()V") => Builtin::ThreadInit,
            (rc::THREAD, "<init>", _) => Builtin::ThreadInitTarget,
            (rc::THREAD, "run", _) => Builtin::ThreadRun,
            (rc::THREAD, "start", _) => Builtin::ThreadStart,
            (rc::THREAD, "join", _) => Builtin::ThreadJoin,
            (rc::THREAD, "interrupt", _) => Builtin::ThreadInterrupt,
            (rc::THREAD, "isInterrupted", _) => Builtin::ThreadIsInterrupted,
            (rc::THREAD, "sleep", _) => Builtin::ThreadSleep,
            (rc::THREAD, "interrupted", _) => Builtin::ThreadInterrupted,
            (rc::THREAD, "currentThread", _) => Builtin::CurrentThread,
            ("java/lang/System", "gc", _) => Builtin::SystemGc,
            (rc::THROWABLE, "getMessage", _) => Builtin::GetMessage,
            (_, "<init>", "()V") if rc::is_throwable_class(class) => Builtin::ThrowableInit,
            (_, "<init>", _) if rc::is_throwable_class(class) => Builtin::ThrowableInitMessage,
            _ => return None,
        };
        Some(builtin)
    }
}

fn builtin_symbols() -> HashMap<String, Builtin> {
    let mut methods: Vec<(&str, &str, &str)> = rc::RUNTIME_METHODS
        .iter()
        .map(|m| (m.class, m.name, m.descriptor))
        .collect();
    for class in rc::RUNTIME_CLASSES.iter().filter(|c| rc::is_throwable_class(c.name)) {
        for ctor in rc::THROWABLE_CONSTRUCTORS {
            methods.push((class.name, "<init>", ctor));
        }
    }
    methods
        .into_iter()
        .filter_map(|(class, name, descriptor)| {
            let builtin = Builtin::for_method(class, name, descriptor)?;
            let parsed = MethodDescriptor::parse(descriptor).ok()?;
            Some((mangle::method_symbol(class, name, &parsed), builtin))
        })
        .collect()
}

struct RawClass {
    super_name: Option<String>,
    interfaces: Vec<String>,
    is_interface: bool,
    own_fields: Vec<FieldSlot>,
    clinit: Option<String>,
}

fn runtime_raw(class: &RuntimeClass) -> RawClass {
    RawClass {
        super_name: class.super_name.map(str::to_string),
        interfaces: class.interfaces.iter().map(|i| i.to_string()).collect(),
        is_interface: class.is_interface,
        own_fields: class
            .fields
            .iter()
            .filter_map(|(name, descriptor)| {
                Some(FieldSlot {
                    owner: class.name.to_string(),
                    name: name.to_string(),
                    ty: JavaType::parse(descriptor).ok()?,
                })
            })
            .collect(),
        clinit: None,
    }
}

#[derive(Debug)]
pub struct Program {
    classes: IndexMap<String, ClassInfo>,
    methods: Vec<LoweredMethod>,
    by_symbol: HashMap<String, usize>,
    builtins: HashMap<String, Builtin>,
    pub dispatch: DispatchTables,
    pub strings: Vec<String>,
    pub entry_symbol: String,
    /// Static fields of every class, with their declaring class.
    pub statics: Vec<(String, StaticField)>,
}

impl Program {
    pub fn new(lowered: LoweredProgram) -> Self {
        let mut raw: HashMap<String, RawClass> = HashMap::new();
        for class in rc::RUNTIME_CLASSES {
            raw.insert(class.name.to_string(), runtime_raw(class));
        }
        let mut methods = Vec::new();
        let mut statics = Vec::new();
        for class in lowered.classes {
            raw.insert(
                class.name.clone(),
                RawClass {
                    super_name: class.super_name.clone(),
                    interfaces: class.interfaces.clone(),
                    is_interface: class.is_interface,
                    own_fields: class
                        .instance_fields
                        .iter()
                        .map(|(name, ty)| FieldSlot {
                            owner: class.name.clone(),
                            name: name.clone(),
                            ty: ty.clone(),
                        })
                        .collect(),
                    clinit: class.clinit_symbol.clone(),
                },
            );
            statics.extend(class.static_fields.into_iter().map(|f| (class.name.clone(), f)));
            methods.extend(class.methods);
        }

        let mut classes = IndexMap::new();
        let mut names: Vec<String> = raw.keys().cloned().collect();
        names.sort();
        for name in names {
            let fields = layout(&raw, &name, &mut HashSet::new());
            let Some(class) = raw.get(&name) else {
                continue;
            };
            let descriptor = TypeDescriptor::new(
                &name,
                fields
                    .iter()
                    .map(|f| f.ty.value_kind().unwrap_or(classport_core::ValueKind::Int))
                    .collect(),
            );
            classes.insert(
                name.clone(),
                ClassInfo {
                    name: name.clone(),
                    super_name: class.super_name.clone(),
                    interfaces: class.interfaces.clone(),
                    is_interface: class.is_interface,
                    fields,
                    clinit: class.clinit.clone(),
                    descriptor,
                },
            );
        }

        let by_symbol = methods
            .iter()
            .enumerate()
            .map(|(i, m): (usize, &LoweredMethod)| (m.symbol.clone(), i))
            .collect();
        debug!(
            classes = classes.len(),
            methods = methods.len(),
            "program loaded"
        );
        Self {
            classes,
            methods,
            by_symbol,
            builtins: builtin_symbols(),
            dispatch: lowered.dispatch,
            strings: lowered.strings,
            entry_symbol: lowered.entry_symbol,
            statics,
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Every class, runtime classes included, sorted by name.
    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn method(&self, index: usize) -> Option<&LoweredMethod> {
        self.methods.get(index)
    }

    pub fn method_index(&self, symbol: &str) -> Option<usize> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn builtin(&self, symbol: &str) -> Option<Builtin> {
        self.builtins.get(symbol).copied()
    }

    pub fn symbol_of(class: &str, name: &str, descriptor: &str) -> Option<String> {
        let parsed = MethodDescriptor::parse(descriptor).ok()?;
        Some(mangle::method_symbol(class, name, &parsed))
    }

    /// Whether `sub` is `sup` or inherits from it through superclasses or interfaces.
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sup == rc::OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut work = vec![sub];
        while let Some(name) = work.pop() {
            if name == sup {
                return true;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(class) = self.classes.get(name) {
                work.extend(class.super_name.as_deref());
                work.extend(class.interfaces.iter().map(String::as_str));
            }
        }
        false
    }

    /// Assignment compatibility between two reference types.
    pub fn is_assignable(&self, from: &JavaType, to: &JavaType) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (JavaType::Object(f), JavaType::Object(t)) => self.is_subclass(f, t),
            (JavaType::Array { .. }, JavaType::Object(t)) => t == rc::OBJECT,
            (JavaType::Array { .. }, JavaType::Array { .. }) => {
                match (from.component(), to.component()) {
                    (Some(f), Some(t)) if f.is_reference() && t.is_reference() => {
                        self.is_assignable(&f, &t)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

fn layout(raw: &HashMap<String, RawClass>, name: &str, visiting: &mut HashSet<String>) -> Vec<FieldSlot> {
    let Some(class) = raw.get(name) else {
        return Vec::new();
    };
    if !visiting.insert(name.to_string()) {
        return Vec::new();
    }
    let mut fields = match &class.super_name {
        Some(parent) => layout(raw, parent, visiting),
        None => Vec::new(),
    };
    fields.extend(class.own_fields.iter().cloned());
    fields
}
