/*! The fixed set of classes, methods and C functions the runtime provides.
 *
 * Lowered code may reference anything listed here without an emitted definition. The same tables
 * drive the throwable hierarchy of the reference runtime, so the two cannot drift apart.
 */

use super::mangle;
use crate::types::MethodDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeClass {
    pub name: &'static str,
    pub super_name: Option<&'static str>,
    pub interfaces: &'static [&'static str],
    pub is_interface: bool,
    /// Instance fields as `(name, descriptor)`.
    pub fields: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMethod {
    pub class: &'static str,
    pub name: &'static str,
    pub descriptor: &'static str,
    pub is_static: bool,
    /// Participates in virtual dispatch (can be overridden).
    pub is_virtual: bool,
}

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";
pub const THROWABLE: &str = "java/lang/Throwable";
pub const THREAD: &str = "java/lang/Thread";
pub const RUNNABLE: &str = "java/lang/Runnable";
pub const STACK_OVERFLOW_ERROR: &str = "java/lang/StackOverflowError";
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
pub const CLASS_CAST_EXCEPTION: &str = "java/lang/ClassCastException";
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";
pub const ILLEGAL_MONITOR_STATE_EXCEPTION: &str = "java/lang/IllegalMonitorStateException";
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/ArrayIndexOutOfBoundsException";
pub const INTERRUPTED_EXCEPTION: &str = "java/lang/InterruptedException";
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "java/lang/IllegalArgumentException";
pub const ABSTRACT_METHOD_ERROR: &str = "java/lang/AbstractMethodError";

const NO_FIELDS: &[(&str, &str)] = &[];

const fn class(name: &'static str, super_name: &'static str) -> RuntimeClass {
    RuntimeClass {
        name,
        super_name: Some(super_name),
        interfaces: &[],
        is_interface: false,
        fields: NO_FIELDS,
    }
}

pub const RUNTIME_CLASSES: &[RuntimeClass] = &[
    RuntimeClass {
        name: OBJECT,
        super_name: None,
        interfaces: &[],
        is_interface: false,
        fields: NO_FIELDS,
    },
    class(STRING, OBJECT),
    class("java/lang/Class", OBJECT),
    class("java/lang/System", OBJECT),
    RuntimeClass {
        name: RUNNABLE,
        super_name: Some(OBJECT),
        interfaces: &[],
        is_interface: true,
        fields: NO_FIELDS,
    },
    RuntimeClass {
        name: THREAD,
        super_name: Some(OBJECT),
        interfaces: &[RUNNABLE],
        is_interface: false,
        fields: &[("target", "Ljava/lang/Runnable;")],
    },
    RuntimeClass {
        name: THROWABLE,
        super_name: Some(OBJECT),
        interfaces: &[],
        is_interface: false,
        fields: &[("detailMessage", "Ljava/lang/String;")],
    },
    class("java/lang/Error", THROWABLE),
    class("java/lang/VirtualMachineError", "java/lang/Error"),
    class(STACK_OVERFLOW_ERROR, "java/lang/VirtualMachineError"),
    class("java/lang/LinkageError", "java/lang/Error"),
    class(
        "java/lang/IncompatibleClassChangeError",
        "java/lang/LinkageError",
    ),
    class(ABSTRACT_METHOD_ERROR, "java/lang/IncompatibleClassChangeError"),
    class("java/lang/Exception", THROWABLE),
    class(INTERRUPTED_EXCEPTION, "java/lang/Exception"),
    class("java/lang/RuntimeException", "java/lang/Exception"),
    class(NULL_POINTER_EXCEPTION, "java/lang/RuntimeException"),
    class(ARITHMETIC_EXCEPTION, "java/lang/RuntimeException"),
    class(CLASS_CAST_EXCEPTION, "java/lang/RuntimeException"),
    class(NEGATIVE_ARRAY_SIZE_EXCEPTION, "java/lang/RuntimeException"),
    class(ILLEGAL_MONITOR_STATE_EXCEPTION, "java/lang/RuntimeException"),
    class(ILLEGAL_ARGUMENT_EXCEPTION, "java/lang/RuntimeException"),
    class(
        "java/lang/IndexOutOfBoundsException",
        "java/lang/RuntimeException",
    ),
    class(
        ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
        "java/lang/IndexOutOfBoundsException",
    ),
];

const fn virtual_method(
    class: &'static str,
    name: &'static str,
    descriptor: &'static str,
) -> RuntimeMethod {
    RuntimeMethod {
        class,
        name,
        descriptor,
        is_static: false,
        is_virtual: true,
    }
}

const fn final_method(
    class: &'static str,
    name: &'static str,
    descriptor: &'static str,
) -> RuntimeMethod {
    RuntimeMethod {
        class,
        name,
        descriptor,
        is_static: false,
        is_virtual: false,
    }
}

const fn static_method(
    class: &'static str,
    name: &'static str,
    descriptor: &'static str,
) -> RuntimeMethod {
    RuntimeMethod {
        class,
        name,
        descriptor,
        is_static: true,
        is_virtual: false,
    }
}

/// Methods of runtime classes other than throwable constructors, which `runtime_method` derives.
pub const RUNTIME_METHODS: &[RuntimeMethod] = &[
    final_method(OBJECT, "<init>", "()V"),
    virtual_method(OBJECT, "equals", "(Ljava/lang/Object;)Z"),
    virtual_method(OBJECT, "hashCode", "()I"),
    virtual_method(OBJECT, "toString", "()Ljava/lang/String;"),
    final_method(OBJECT, "wait", "()V"),
    final_method(OBJECT, "wait", "(J)V"),
    final_method(OBJECT, "notify", "()V"),
    final_method(OBJECT, "notifyAll", "()V"),
    final_method(STRING, "length", "()I"),
    virtual_method(RUNNABLE, "run", "()V"),
    final_method(THREAD, "<init>", "()V"),
    final_method(THREAD, "<init>", "(Ljava/lang/Runnable;)V"),
    virtual_method(THREAD, "run", "()V"),
    final_method(THREAD, "start", "()V"),
    final_method(THREAD, "join", "()V"),
    final_method(THREAD, "interrupt", "()V"),
    final_method(THREAD, "isInterrupted", "()Z"),
    static_method(THREAD, "sleep", "(J)V"),
    static_method(THREAD, "interrupted", "()Z"),
    static_method(THREAD, "currentThread", "()Ljava/lang/Thread;"),
    static_method("java/lang/System", "gc", "()V"),
    virtual_method(THROWABLE, "getMessage", "()Ljava/lang/String;"),
];

/// Constructors every runtime throwable class provides.
pub const THROWABLE_CONSTRUCTORS: &[&str] = &["()V", "(Ljava/lang/String;)V"];

/// Calls the runtime makes on behalf of a runtime method: when a live call site targets the
/// first member, the second is dispatched virtually on the receiver.
pub const IMPLIED_CALLS: &[((&str, &str, &str), (&str, &str, &str))] = &[
    ((THREAD, "start", "()V"), (THREAD, "run", "()V")),
    (
        (THREAD, "<init>", "(Ljava/lang/Runnable;)V"),
        (RUNNABLE, "run", "()V"),
    ),
];

/// C functions declared by the runtime-support header.
pub mod functions {
    pub const ENTER_METHOD: &str = "classport_enter_method";
    pub const LEAVE_METHOD: &str = "classport_leave_method";
    pub const THROW: &str = "classport_throw";
    pub const THROW_NEW: &str = "classport_throw_new";
    pub const MONITOR_ENTER: &str = "classport_monitor_enter";
    pub const MONITOR_EXIT: &str = "classport_monitor_exit";
    pub const ALLOC_OBJECT: &str = "classport_alloc_object";
    pub const ALLOC_ARRAY: &str = "classport_alloc_array";
    pub const ALLOC_2D_ARRAY: &str = "classport_alloc_2d_array";
    pub const ALLOC_MULTI_ARRAY: &str = "classport_alloc_multi_array";
    pub const CLASS_INIT: &str = "classport_class_init";
    pub const INSTANCE_OF: &str = "classport_instanceof";
    pub const CHECK_CAST: &str = "classport_checkcast";
    pub const STRING_CONSTANT: &str = "classport_string_constant";
    pub const CLASS_LITERAL: &str = "classport_class_literal";
    pub const VTABLE_LOOKUP: &str = "classport_vtable_lookup";
    pub const ITABLE_LOOKUP: &str = "classport_itable_lookup";
    pub const RELEASE_FRAME_MONITORS: &str = "classport_release_frame_monitors";
}

pub const RUNTIME_FUNCTIONS: &[&str] = &[
    functions::ENTER_METHOD,
    functions::LEAVE_METHOD,
    functions::THROW,
    functions::THROW_NEW,
    functions::MONITOR_ENTER,
    functions::MONITOR_EXIT,
    functions::ALLOC_OBJECT,
    functions::ALLOC_ARRAY,
    functions::ALLOC_2D_ARRAY,
    functions::ALLOC_MULTI_ARRAY,
    functions::CLASS_INIT,
    functions::INSTANCE_OF,
    functions::CHECK_CAST,
    functions::STRING_CONSTANT,
    functions::CLASS_LITERAL,
    functions::VTABLE_LOOKUP,
    functions::ITABLE_LOOKUP,
    functions::RELEASE_FRAME_MONITORS,
];

pub fn runtime_class(name: &str) -> Option<&'static RuntimeClass> {
    RUNTIME_CLASSES.iter().find(|c| c.name == name)
}

pub fn is_runtime_class(name: &str) -> bool {
    runtime_class(name).is_some()
}

pub fn is_throwable_class(name: &str) -> bool {
    let mut current = runtime_class(name);
    while let Some(class) = current {
        if class.name == THROWABLE {
            return true;
        }
        current = class.super_name.and_then(runtime_class);
    }
    false
}

/// Looks up a runtime method declared directly on `class`.
pub fn runtime_method(class: &str, name: &str, descriptor: &str) -> Option<RuntimeMethod> {
    if let Some(method) = RUNTIME_METHODS
        .iter()
        .find(|m| m.class == class && m.name == name && m.descriptor == descriptor)
    {
        return Some(*method);
    }
    let runtime = runtime_class(class)?;
    if name == "<init>" && is_throwable_class(class) && THROWABLE_CONSTRUCTORS.contains(&descriptor)
    {
        return Some(final_method(runtime.name, "<init>", throwable_ctor(descriptor)));
    }
    None
}

fn throwable_ctor(descriptor: &str) -> &'static str {
    THROWABLE_CONSTRUCTORS
        .iter()
        .copied()
        .find(|d| *d == descriptor)
        .unwrap_or("()V")
}

/// Runtime methods of `class` that take part in virtual dispatch, in declaration order.
pub fn virtual_methods(class: &str) -> impl Iterator<Item = &'static RuntimeMethod> + '_ {
    RUNTIME_METHODS
        .iter()
        .filter(move |m| m.class == class && m.is_virtual)
}

/// Every C symbol the runtime defines: functions, class objects and method bodies.
pub fn defined_symbols() -> Vec<String> {
    let mut symbols: Vec<String> = RUNTIME_FUNCTIONS.iter().map(|f| f.to_string()).collect();
    for class in RUNTIME_CLASSES {
        symbols.push(mangle::class_symbol(class.name));
        if is_throwable_class(class.name) {
            for ctor in THROWABLE_CONSTRUCTORS {
                if let Ok(desc) = MethodDescriptor::parse(ctor) {
                    symbols.push(mangle::method_symbol(class.name, "<init>", &desc));
                }
            }
        }
    }
    for method in RUNTIME_METHODS {
        if let Ok(desc) = MethodDescriptor::parse(method.descriptor) {
            symbols.push(mangle::method_symbol(method.class, method.name, &desc));
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throwable_hierarchy() {
        assert!(is_throwable_class(STACK_OVERFLOW_ERROR));
        assert!(is_throwable_class(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION));
        assert!(is_throwable_class(ABSTRACT_METHOD_ERROR));
        assert!(!is_throwable_class(THREAD));
        assert!(runtime_method(NULL_POINTER_EXCEPTION, "<init>", "()V").is_some());
        assert!(runtime_method(THREAD, "<init>", "(I)V").is_none());
    }

    #[test]
    fn test_defined_symbols_include_object_constructor() {
        let symbols = defined_symbols();
        assert!(symbols.contains(&"java_lang_Object___INIT____".to_string()));
        assert!(symbols.contains(&"class__java_lang_StackOverflowError".to_string()));
        assert!(symbols.contains(&functions::MONITOR_ENTER.to_string()));
    }
}
