use super::fixtures::{entry_config, lower, shapes_program, single_class, MAIN};
use crate::class_unit::{ClassHeaderEmitter, ClassSourceEmitter};
use crate::config::EmitterConfig;
use crate::emitter::Emitter;
use crate::metadata::MetadataEmitter;
use crate::runtime_header::RuntimeHeaderEmitter;
use crate::tables::SharedTables;
use classport_core::config::DEFAULT_ENTRY_DESCRIPTOR;
use classport_core::{ConstantValue, LoweredProgram, RuntimeConfig, TableBuilder};
use pretty_assertions::assert_eq;

fn header(program: &LoweredProgram, class: &str) -> String {
    let config = EmitterConfig::default();
    ClassHeaderEmitter::new(program, &config)
        .emit_to_string(program.class(class).unwrap())
        .unwrap()
}

fn source(program: &LoweredProgram, class: &str) -> String {
    let config = EmitterConfig::default();
    let tables = SharedTables::build(program);
    ClassSourceEmitter::new(program, &tables, &config)
        .emit_to_string(program.class(class).unwrap())
        .unwrap()
}

fn metadata(program: &LoweredProgram) -> String {
    let config = EmitterConfig::default();
    let tables = SharedTables::build(program);
    MetadataEmitter::new(&tables, &config)
        .emit_to_string(program)
        .unwrap()
}

#[test]
fn test_runtime_header_declares_contract() {
    let config = EmitterConfig::default();
    let text = RuntimeHeaderEmitter::new(&config)
        .emit_to_string(&RuntimeConfig::default())
        .unwrap();

    assert!(text.contains("#ifndef CLASSPORT_RUNTIME_H_"));
    assert!(text.contains("#define CLASSPORT_MAX_CALL_DEPTH 1024"));
    assert!(text.contains("#define CLASSPORT_NULL_CHECKS 1"));
    assert!(text.contains("CP_SLOT* classport_enter_method(CLASSPORT_THREAD_STATE* ts, JAVA_INT slots);"));
    assert!(text.contains("extern CLASSPORT_CLASS class__java_lang_Object;"));
    assert!(text.contains("struct java_lang_Object_object {\n    CLASSPORT_OBJECT header;\n"));
    assert!(text.contains("extern const CLASSPORT_TYPE classport_types[];"));
    assert!(text.trim_end().ends_with("#endif /* CLASSPORT_RUNTIME_H_ */"));
}

#[test]
fn test_runtime_header_limits_follow_config() {
    let config = EmitterConfig::default();
    let runtime = RuntimeConfig {
        max_call_depth: 64,
        bounds_checks: false,
        ..RuntimeConfig::default()
    };
    let text = RuntimeHeaderEmitter::new(&config)
        .emit_to_string(&runtime)
        .unwrap();
    assert!(text.contains("#define CLASSPORT_MAX_CALL_DEPTH 64"));
    assert!(text.contains("#define CLASSPORT_BOUNDS_CHECKS 0"));
}

#[test]
fn test_subclass_header_embeds_parent_layout() {
    let program = shapes_program();

    let derived = header(&program, "app/Derived");
    assert!(derived.contains("#include \"classport_runtime.h\""));
    assert!(derived.contains("#include \"app_Base.h\""));
    assert!(derived.contains("struct app_Derived_object {\n    struct app_Base_object parent;\n};"));
    assert!(derived.contains("extern CLASSPORT_CLASS class__app_Derived;"));
    assert!(derived.contains("void app_Derived___INIT____(CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT self);"));

    let base = header(&program, "app/Base");
    assert!(base.contains("struct java_lang_Object_object parent;"));
    assert!(!base.contains("#include \"java_lang_Object.h\""));
}

#[test]
fn test_instance_fields_and_statics_in_units() {
    let program = single_class(|c| {
        c.field("count", "I")?;
        c.static_field("total", "J")?;
        c.constant_field("LIMIT", ConstantValue::Int(-3))?;
        let mut m = c.method("bump", "()V");
        m.aload(0)
            .aload(0)
            .getfield(MAIN, "count", "I")
            .iconst(1)
            .iadd()
            .putfield(MAIN, "count", "I")
            .getstatic(MAIN, "total", "J")
            .lconst(1)
            .arith(classport_core::ValueKind::Long, classport_core::instructions::ArithOp::Add)
            .putstatic(MAIN, "total", "J")
            .getstatic(MAIN, "LIMIT", "I")
            .pop()
            .return_void();
        m.build()
    });

    let h = header(&program, MAIN);
    assert!(h.contains("JAVA_INT f_count;"));
    assert!(h.contains("extern JAVA_LONG STATIC_FIELD_app_Main_total;"));

    let c = source(&program, MAIN);
    assert!(c.contains("#include \"app_Main.h\""));
    assert!(c.contains("JAVA_LONG STATIC_FIELD_app_Main_total = 0;"));
    assert!(c.contains("JAVA_INT STATIC_FIELD_app_Main_LIMIT = -3;"));
    assert!(c.contains("STATIC_FIELD_app_Main_total = value;"));
    assert!(c.contains("void app_Main_bump__(CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT self)\n{"));
}

#[test]
fn test_string_constant_statics_get_initializer_function() {
    let program = single_class(|c| {
        c.constant_field("GREETING", ConstantValue::String("hello".to_string()))?;
        let mut m = c.static_method("greeting", "()Ljava/lang/String;");
        m.getstatic(MAIN, "GREETING", "Ljava/lang/String;").areturn();
        m.build()
    });
    let tables = SharedTables::build(&program);
    let index = tables.string_index("hello").unwrap();

    let h = header(&program, MAIN);
    assert!(h.contains("void app_Main___CONSTANTS__(CLASSPORT_THREAD_STATE* ts);"));
    let c = source(&program, MAIN);
    assert!(c.contains("JAVA_OBJECT STATIC_FIELD_app_Main_GREETING = NULL;"));
    assert!(c.contains(&format!(
        "STATIC_FIELD_app_Main_GREETING = classport_string_constant(ts, {});",
        index
    )));
    let m = metadata(&program);
    assert!(m.contains("app_Main___CONSTANTS__,"));
    assert!(m.contains("&STATIC_FIELD_app_Main_GREETING,"));
}

#[test]
fn test_source_includes_headers_of_classes_it_uses() {
    let program = shapes_program();
    let main = source(&program, MAIN);
    assert!(main.contains("#include \"app_Derived.h\""));
    assert!(!main.contains("#include \"app_Other.h\""));
}

#[test]
fn test_metadata_lays_out_vtables_and_class_objects() {
    let program = shapes_program();
    let text = metadata(&program);

    assert!(text.contains("#include \"app_Derived.h\""));
    assert!(text.contains("void* const VTABLE_app_Derived[] = {"));
    assert!(text.contains("(void*) &app_Derived_speak__,"));
    assert!(text.contains("CLASSPORT_CLASS class__app_Derived = {"));
    assert!(text.contains("&class__app_Base,"));
    assert!(text.contains("sizeof(struct app_Derived_object),"));
    assert!(text.contains("CLASSPORT_CLASS* const classport_class_table[] = {"));
    assert!(text.contains("&class__java_lang_Object,"));
    assert!(text.contains(&format!(
        "const JAVA_INT classport_class_count = {};",
        program.dispatch.len()
    )));
    assert!(text.contains(&format!(
        "void* const classport_entry_point = (void*) &{};",
        program.entry_symbol
    )));
    // runtime classes keep their objects in the runtime library
    assert!(!text.contains("CLASSPORT_CLASS class__java_lang_Object = {"));
}

#[test]
fn test_empty_tables_get_placeholder_rows() {
    let program = single_class(|_| Ok(()));
    let text = metadata(&program);

    assert!(text.contains("const CLASSPORT_TYPE classport_types[] = {\n    { NULL, NULL, 0, 0 },\n};"));
    assert!(text.contains("const JAVA_INT classport_type_count = 0;"));
    assert!(text.contains("const JAVA_INT classport_string_count = 0;"));
    assert!(text.contains("const JAVA_INT classport_static_root_count = 0;"));
}

#[test]
fn test_array_types_record_element_layout() {
    let program = single_class(|c| {
        let mut m = c.static_method("make", "()[[I");
        m.iconst(2)
            .iconst(3)
            .multianewarray(classport_core::JavaType::parse("[[I")?, 2)
            .areturn();
        m.build()?;
        let mut n = c.static_method("bytes", "()[B");
        n.iconst(4).newarray(classport_core::JavaType::Byte).areturn();
        n.build()
    });
    let text = metadata(&program);
    assert!(text.contains("{ \"[[I\", NULL, 2, 0 },"));
    assert!(text.contains("{ \"[B\", NULL, 1, 1 },"));

    let c = source(&program, MAIN);
    assert!(c.contains("JAVA_OBJECT array = classport_alloc_2d_array(ts, &classport_types[0], outer, inner);"));
    assert!(c.contains("JAVA_OBJECT array = classport_alloc_array(ts, &classport_types[1], length);"));
}

#[test]
fn test_interface_implementations_fill_itable() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.construct("app/Square")
            .invoke_interface("app/Shape", "area", "()I")
            .pop()
            .return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut shape = builder.class("app/Shape");
        shape.interface().abstract_method("area", "()I").unwrap();
        shape.build().unwrap();
    }
    {
        let mut square = builder.class("app/Square");
        square.implements("app/Shape").default_constructor().unwrap();
        let mut m = square.method("area", "()I");
        m.iconst(4).ireturn();
        m.build().unwrap();
        square.build().unwrap();
    }
    let program = lower(builder.finish());

    let text = metadata(&program);
    assert!(text.contains("const CLASSPORT_ITABLE_ENTRY ITABLE_app_Square[] = {"));
    assert!(text.contains("{ \"area\", \"()I\", (void*) &app_Square_area___R_int },"));
    assert!(text.contains("static CLASSPORT_CLASS* const INTERFACES_app_Square[] = {"));
    assert!(text.contains("CLASSPORT_CLASS_INTERFACE,"));

    let shape = header(&program, "app/Shape");
    assert!(!shape.contains("struct app_Shape_object"));
    assert!(shape.contains("extern CLASSPORT_CLASS class__app_Shape;"));
}
