/*! The fixed-name runtime-support header.
 *
 * Declares the value model (tagged stack slots, object and array headers, class and type
 * descriptors, per-thread state), the runtime functions generated code calls, the runtime classes
 * and their methods, and the globals the metadata unit defines. The statement macros assume the
 * locals `ts`, `locals`, `stack` and `sp` and the label `cp_unwind` that every generated method
 * body declares.
 */

use crate::c_syntax;
use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
use anyhow::anyhow;
use classport_core::codegen::mangle;
use classport_core::codegen::runtime_contract::{self as rc, functions, RuntimeClass};
use classport_core::{JavaType, MethodDescriptor, RuntimeConfig};
use std::collections::HashSet;
use std::io::Write;

/// `(function, return type, parameters)` for every runtime function.
pub const RUNTIME_FUNCTION_SIGNATURES: &[(&str, &str, &str)] = &[
    (
        functions::ENTER_METHOD,
        "CP_SLOT*",
        "CLASSPORT_THREAD_STATE* ts, JAVA_INT slots",
    ),
    (
        functions::LEAVE_METHOD,
        "void",
        "CLASSPORT_THREAD_STATE* ts, CP_SLOT* frame",
    ),
    (
        functions::THROW,
        "void",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT exception",
    ),
    (
        functions::THROW_NEW,
        "void",
        "CLASSPORT_THREAD_STATE* ts, CLASSPORT_CLASS* cls, const char* message",
    ),
    (
        functions::MONITOR_ENTER,
        "void",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj",
    ),
    (
        functions::MONITOR_EXIT,
        "void",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj",
    ),
    (
        functions::ALLOC_OBJECT,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, CLASSPORT_CLASS* cls",
    ),
    (
        functions::ALLOC_ARRAY,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, const CLASSPORT_TYPE* type, JAVA_INT length",
    ),
    (
        functions::ALLOC_2D_ARRAY,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, const CLASSPORT_TYPE* type, JAVA_INT outer, JAVA_INT inner",
    ),
    (
        functions::ALLOC_MULTI_ARRAY,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, const CLASSPORT_TYPE* type, JAVA_INT dims, const JAVA_INT* lengths",
    ),
    (
        functions::CLASS_INIT,
        "void",
        "CLASSPORT_THREAD_STATE* ts, CLASSPORT_CLASS* cls",
    ),
    (
        functions::INSTANCE_OF,
        "JAVA_INT",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj, const CLASSPORT_TYPE* type",
    ),
    (
        functions::CHECK_CAST,
        "JAVA_INT",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj, const CLASSPORT_TYPE* type",
    ),
    (
        functions::STRING_CONSTANT,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, JAVA_INT index",
    ),
    (
        functions::CLASS_LITERAL,
        "JAVA_OBJECT",
        "CLASSPORT_THREAD_STATE* ts, const CLASSPORT_TYPE* type",
    ),
    (
        functions::VTABLE_LOOKUP,
        "void*",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj, JAVA_INT slot",
    ),
    (
        functions::ITABLE_LOOKUP,
        "void*",
        "CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT obj, const char* name, const char* descriptor",
    ),
    (
        functions::RELEASE_FRAME_MONITORS,
        "void",
        "CLASSPORT_THREAD_STATE* ts, CP_SLOT* frame",
    ),
];

const TYPES: &str = r#"typedef int32_t JAVA_INT;
typedef int64_t JAVA_LONG;
typedef float JAVA_FLOAT;
typedef double JAVA_DOUBLE;
typedef int8_t JAVA_BYTE;
typedef int8_t JAVA_BOOLEAN;
typedef uint16_t JAVA_CHAR;
typedef int16_t JAVA_SHORT;

struct classport_class;
struct classport_type;
struct classport_thread_state;

typedef struct classport_object {
    struct classport_class* cls;
    const struct classport_type* type;
    JAVA_INT gc_mark;
} CLASSPORT_OBJECT;

typedef CLASSPORT_OBJECT* JAVA_OBJECT;

typedef struct classport_array {
    CLASSPORT_OBJECT header;
    JAVA_INT length;
    JAVA_INT dims;
    /* 0 when the elements are references */
    JAVA_INT element_size;
    void* data;
} CLASSPORT_ARRAY;

enum {
    CP_KIND_INT,
    CP_KIND_LONG,
    CP_KIND_FLOAT,
    CP_KIND_DOUBLE,
    CP_KIND_REF
};

typedef struct cp_slot {
    JAVA_INT kind;
    union {
        JAVA_INT i;
        JAVA_LONG l;
        JAVA_FLOAT f;
        JAVA_DOUBLE d;
        JAVA_OBJECT o;
    } v;
} CP_SLOT;

typedef struct classport_type {
    const char* descriptor;
    struct classport_class* element_class;
    JAVA_INT dims;
    JAVA_INT element_size;
} CLASSPORT_TYPE;

typedef struct classport_itable_entry {
    const char* name;
    const char* descriptor;
    void* function;
} CLASSPORT_ITABLE_ENTRY;

#define CLASSPORT_CLASS_INTERFACE 0x1
#define CLASSPORT_CLASS_ABSTRACT 0x2

typedef struct classport_class {
    const char* name;
    JAVA_INT id;
    JAVA_INT flags;
    struct classport_class* super;
    struct classport_class* const* interfaces;
    JAVA_INT interface_count;
    size_t instance_size;
    void* const* vtable;
    JAVA_INT vtable_length;
    const CLASSPORT_ITABLE_ENTRY* itable;
    JAVA_INT itable_length;
    void (*constants)(struct classport_thread_state* ts);
    void (*clinit)(struct classport_thread_state* ts);
} CLASSPORT_CLASS;

typedef struct classport_thread_state {
    JAVA_INT call_depth;
    /* object-stack window: locals and operand stacks of every active frame */
    CP_SLOT* object_stack;
    CP_SLOT* stack_top;
    JAVA_OBJECT pending_exception;
    /* allocations not yet stored into a frame, kept alive across collections */
    JAVA_OBJECT pending_allocations[CLASSPORT_PENDING_ALLOCATIONS];
    JAVA_INT pending_count;
    volatile JAVA_INT interrupted;
    JAVA_OBJECT thread_object;
} CLASSPORT_THREAD_STATE;
"#;

const GLOBALS: &str = r#"extern const CLASSPORT_TYPE classport_types[];
extern const JAVA_INT classport_type_count;
extern const char* const classport_strings[];
extern const JAVA_INT classport_string_lengths[];
extern const JAVA_INT classport_string_count;
extern CLASSPORT_CLASS* const classport_class_table[];
extern const JAVA_INT classport_class_count;
extern JAVA_OBJECT* const classport_static_roots[];
extern const JAVA_INT classport_static_root_count;
extern void* const classport_entry_point;
"#;

const MACROS: &str = r#"#define CP_PUSH(member, tag, value) do { stack[sp].kind = (tag); stack[sp].v.member = (value); sp++; } while (0)
#define CP_PUSH_I(x) CP_PUSH(i, CP_KIND_INT, (x))
#define CP_PUSH_L(x) CP_PUSH(l, CP_KIND_LONG, (x))
#define CP_PUSH_F(x) CP_PUSH(f, CP_KIND_FLOAT, (x))
#define CP_PUSH_D(x) CP_PUSH(d, CP_KIND_DOUBLE, (x))
#define CP_PUSH_O(x) CP_PUSH(o, CP_KIND_REF, (x))
#define CP_POP_I() (stack[--sp].v.i)
#define CP_POP_L() (stack[--sp].v.l)
#define CP_POP_F() (stack[--sp].v.f)
#define CP_POP_D() (stack[--sp].v.d)
#define CP_POP_O() (stack[--sp].v.o)
#define CP_SET(slot, member, tag, value) do { locals[(slot)].kind = (tag); locals[(slot)].v.member = (value); } while (0)
#define CP_SET_I(slot, x) CP_SET(slot, i, CP_KIND_INT, (x))
#define CP_SET_L(slot, x) CP_SET(slot, l, CP_KIND_LONG, (x))
#define CP_SET_F(slot, x) CP_SET(slot, f, CP_KIND_FLOAT, (x))
#define CP_SET_D(slot, x) CP_SET(slot, d, CP_KIND_DOUBLE, (x))
#define CP_SET_O(slot, x) CP_SET(slot, o, CP_KIND_REF, (x))

#define CP_CHECK() do { if (ts->pending_exception != NULL) goto cp_unwind; } while (0)
#define CP_THROW_NEW(cls, message) do { classport_throw_new(ts, (cls), (message)); goto cp_unwind; } while (0)
#define CP_NULL_CHECK(o) do { if ((o) == NULL) CP_THROW_NEW(&class__java_lang_NullPointerException, NULL); } while (0)
#define CP_ZERO_CHECK(d) do { if ((d) == 0) CP_THROW_NEW(&class__java_lang_ArithmeticException, "/ by zero"); } while (0)
#define CP_ARRAY(a) ((CLASSPORT_ARRAY*) (a))
#define CP_ARRAY_LENGTH(a) (CP_ARRAY(a)->length)
#define CP_ELEMENTS(type, a) ((type*) CP_ARRAY(a)->data)
#define CP_BOUNDS_CHECK(a, index) do { if ((index) < 0 || (index) >= CP_ARRAY_LENGTH(a)) { cp_throw_bounds(ts, (index), CP_ARRAY_LENGTH(a)); goto cp_unwind; } } while (0)
"#;

const HELPERS: &str = r#"static inline JAVA_INT cp_iadd(JAVA_INT a, JAVA_INT b) { return (JAVA_INT) ((uint32_t) a + (uint32_t) b); }
static inline JAVA_INT cp_isub(JAVA_INT a, JAVA_INT b) { return (JAVA_INT) ((uint32_t) a - (uint32_t) b); }
static inline JAVA_INT cp_imul(JAVA_INT a, JAVA_INT b) { return (JAVA_INT) ((uint32_t) a * (uint32_t) b); }
static inline JAVA_INT cp_ineg(JAVA_INT a) { return (JAVA_INT) (0u - (uint32_t) a); }
static inline JAVA_INT cp_idiv(JAVA_INT a, JAVA_INT b) { return (a == INT32_MIN && b == -1) ? a : a / b; }
static inline JAVA_INT cp_irem(JAVA_INT a, JAVA_INT b) { return b == -1 ? 0 : a % b; }
static inline JAVA_INT cp_ishl(JAVA_INT a, JAVA_INT n) { return (JAVA_INT) ((uint32_t) a << (n & 31)); }
static inline JAVA_INT cp_ishr(JAVA_INT a, JAVA_INT n) { return a < 0 ? ~(~a >> (n & 31)) : a >> (n & 31); }
static inline JAVA_INT cp_iushr(JAVA_INT a, JAVA_INT n) { return (JAVA_INT) ((uint32_t) a >> (n & 31)); }
static inline JAVA_LONG cp_ladd(JAVA_LONG a, JAVA_LONG b) { return (JAVA_LONG) ((uint64_t) a + (uint64_t) b); }
static inline JAVA_LONG cp_lsub(JAVA_LONG a, JAVA_LONG b) { return (JAVA_LONG) ((uint64_t) a - (uint64_t) b); }
static inline JAVA_LONG cp_lmul(JAVA_LONG a, JAVA_LONG b) { return (JAVA_LONG) ((uint64_t) a * (uint64_t) b); }
static inline JAVA_LONG cp_lneg(JAVA_LONG a) { return (JAVA_LONG) (0u - (uint64_t) a); }
static inline JAVA_LONG cp_ldiv(JAVA_LONG a, JAVA_LONG b) { return (a == INT64_MIN && b == -1) ? a : a / b; }
static inline JAVA_LONG cp_lrem(JAVA_LONG a, JAVA_LONG b) { return b == -1 ? 0 : a % b; }
static inline JAVA_LONG cp_lshl(JAVA_LONG a, JAVA_INT n) { return (JAVA_LONG) ((uint64_t) a << (n & 63)); }
static inline JAVA_LONG cp_lshr(JAVA_LONG a, JAVA_INT n) { return a < 0 ? ~(~a >> (n & 63)) : a >> (n & 63); }
static inline JAVA_LONG cp_lushr(JAVA_LONG a, JAVA_INT n) { return (JAVA_LONG) ((uint64_t) a >> (n & 63)); }
static inline JAVA_INT cp_lcmp(JAVA_LONG a, JAVA_LONG b) { return a < b ? -1 : (a > b ? 1 : 0); }
static inline JAVA_INT cp_fcmp(JAVA_DOUBLE a, JAVA_DOUBLE b, JAVA_INT nan_result) {
    if (a != a || b != b) return nan_result;
    return a < b ? -1 : (a > b ? 1 : 0);
}
static inline JAVA_INT cp_d2i(JAVA_DOUBLE v) {
    if (v != v) return 0;
    if (v >= 2147483647.0) return INT32_MAX;
    if (v <= -2147483648.0) return INT32_MIN;
    return (JAVA_INT) v;
}
static inline JAVA_LONG cp_d2l(JAVA_DOUBLE v) {
    if (v != v) return 0;
    if (v >= 9223372036854775807.0) return INT64_MAX;
    if (v <= -9223372036854775808.0) return INT64_MIN;
    return (JAVA_LONG) v;
}
static inline JAVA_INT cp_l2i(JAVA_LONG v) { return (JAVA_INT) (uint32_t) (uint64_t) v; }
/* copies the top `count` entries below the `depth` entries under them */
static inline void cp_dup(CP_SLOT* stack, JAVA_INT* sp, JAVA_INT count, JAVA_INT depth) {
    CP_SLOT copy[4];
    JAVA_INT top = *sp;
    JAVA_INT i;
    for (i = 0; i < count; i++) copy[i] = stack[top - count + i];
    for (i = top - 1; i >= top - count - depth; i--) stack[i + count] = stack[i];
    for (i = 0; i < count; i++) stack[top - count - depth + i] = copy[i];
    *sp = top + count;
}
static inline void cp_throw_bounds(CLASSPORT_THREAD_STATE* ts, JAVA_INT index, JAVA_INT length) {
    char message[64];
    snprintf(message, sizeof message, "Index %d out of bounds for length %d", (int) index, (int) length);
    classport_throw_new(ts, &class__java_lang_ArrayIndexOutOfBoundsException, message);
}
"#;

pub struct RuntimeHeaderEmitter<'a> {
    config: &'a EmitterConfig,
}

impl<'a> RuntimeHeaderEmitter<'a> {
    pub fn new(config: &'a EmitterConfig) -> Self {
        Self { config }
    }

    fn emit_limits<W: Write>(
        &self,
        runtime: &RuntimeConfig,
        writer: &mut W,
        ctx: &EmitContext,
    ) -> EmitResult {
        let limits = [
            ("CLASSPORT_MAX_CALL_DEPTH", runtime.max_call_depth),
            ("CLASSPORT_OBJECT_STACK_SIZE", runtime.object_stack_size),
            ("CLASSPORT_PENDING_ALLOCATIONS", runtime.pending_allocations),
            ("CLASSPORT_MONITOR_CAPACITY", runtime.monitor_capacity),
        ];
        for (name, value) in limits {
            EmitHelper::write_line(writer, ctx, &format!("#define {} {}", name, value))?;
        }
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("#define CLASSPORT_NULL_CHECKS {}", u8::from(runtime.null_checks)),
        )?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("#define CLASSPORT_BOUNDS_CHECKS {}", u8::from(runtime.bounds_checks)),
        )
    }

    fn emit_functions<W: Write>(&self, writer: &mut W, ctx: &EmitContext) -> EmitResult {
        for name in rc::RUNTIME_FUNCTIONS {
            let (_, ret, params) = RUNTIME_FUNCTION_SIGNATURES
                .iter()
                .find(|(function, _, _)| function == name)
                .ok_or_else(|| anyhow!("no C signature for runtime function {}", name))?;
            EmitHelper::write_line(writer, ctx, &format!("{} {}({});", ret, name, params))?;
        }
        Ok(())
    }

    fn emit_class_structs<W: Write>(&self, writer: &mut W, ctx: &mut EmitContext) -> EmitResult {
        let mut done = HashSet::new();
        for class in rc::RUNTIME_CLASSES {
            self.emit_class_struct(class, &mut done, writer, ctx)?;
        }
        Ok(())
    }

    fn emit_class_struct<W: Write>(
        &self,
        class: &RuntimeClass,
        done: &mut HashSet<&'static str>,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if class.is_interface || !done.insert(class.name) {
            return Ok(());
        }
        let parent = class.super_name.and_then(rc::runtime_class);
        if let Some(parent) = parent {
            self.emit_class_struct(parent, done, writer, ctx)?;
        }
        let header = c_syntax::instance_struct(class.name);
        EmitHelper::write_line(writer, ctx, &format!("{} {{", header))?;
        ctx.indent();
        match parent {
            Some(parent) => EmitHelper::write_line(
                writer,
                ctx,
                &format!("{} parent;", c_syntax::instance_struct(parent.name)),
            )?,
            None => EmitHelper::write_line(writer, ctx, "CLASSPORT_OBJECT header;")?,
        }
        for (name, descriptor) in class.fields {
            let ty = JavaType::parse(descriptor)?;
            EmitHelper::write_line(
                writer,
                ctx,
                &format!("{} {};", ty.c_type(), c_syntax::field_member(name)),
            )?;
        }
        ctx.dedent();
        EmitHelper::write_line(writer, ctx, "};")
    }

    fn emit_runtime_methods<W: Write>(&self, writer: &mut W, ctx: &EmitContext) -> EmitResult {
        let mut methods: Vec<(&str, &str, &str, bool)> = rc::RUNTIME_METHODS
            .iter()
            .map(|m| (m.class, m.name, m.descriptor, m.is_static))
            .collect();
        for class in rc::RUNTIME_CLASSES.iter().filter(|c| rc::is_throwable_class(c.name)) {
            for ctor in rc::THROWABLE_CONSTRUCTORS {
                methods.push((class.name, "<init>", ctor, false));
            }
        }
        for (class, name, descriptor, is_static) in methods {
            let parsed = MethodDescriptor::parse(descriptor)?;
            let symbol = mangle::method_symbol(class, name, &parsed);
            EmitHelper::write_line(
                writer,
                ctx,
                &format!(
                    "{};",
                    c_syntax::prototype(
                        &symbol,
                        !is_static,
                        &parsed.param_kinds(),
                        parsed.return_kind()
                    )
                ),
            )?;
        }
        Ok(())
    }
}

impl Emitter for RuntimeHeaderEmitter<'_> {
    type Item = RuntimeConfig;

    fn emit<W: Write>(
        &self,
        runtime: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let guard = c_syntax::include_guard(&self.config.header_name);
        EmitHelper::write_comment(writer, context, "classport runtime support. Generated, do not edit.")?;
        EmitHelper::write_line(writer, context, &format!("#ifndef {}", guard))?;
        EmitHelper::write_line(writer, context, &format!("#define {}", guard))?;
        EmitHelper::blank(writer)?;
        for include in ["math.h", "stddef.h", "stdint.h", "stdio.h"] {
            EmitHelper::write_line(writer, context, &format!("#include <{}>", include))?;
        }
        EmitHelper::blank(writer)?;
        self.emit_limits(runtime, writer, context)?;
        EmitHelper::blank(writer)?;
        write!(writer, "{}", TYPES)?;

        EmitHelper::write_section(writer, context, "runtime functions")?;
        self.emit_functions(writer, context)?;

        EmitHelper::write_section(writer, context, "runtime classes")?;
        for class in rc::RUNTIME_CLASSES {
            EmitHelper::write_line(
                writer,
                context,
                &format!("extern CLASSPORT_CLASS {};", mangle::class_symbol(class.name)),
            )?;
        }
        self.emit_class_structs(writer, context)?;
        self.emit_runtime_methods(writer, context)?;

        EmitHelper::write_section(writer, context, "program tables")?;
        write!(writer, "{}", GLOBALS)?;

        EmitHelper::write_section(writer, context, "statement support")?;
        write!(writer, "{}", MACROS)?;
        EmitHelper::blank(writer)?;
        write!(writer, "{}", HELPERS)?;
        EmitHelper::blank(writer)?;
        EmitHelper::write_line(writer, context, &format!("#endif /* {} */", guard))?;
        Ok(())
    }
}
