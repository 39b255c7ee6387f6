use super::fixtures::{method, shapes_program, MAIN};
use crate::linkage::check_linkage;
use classport_core::config::DEFAULT_ENTRY_DESCRIPTOR;
use classport_core::{cull, lower_program, CullConfig, LoweredProgram, NativeSource, TableBuilder};
use classport_core::instructions::StackOp;
use classport_core::TranslateError;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

/// `main` calls a native `now()J` that has no Java body.
fn native_program() -> LoweredProgram {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        main.native_method("now", "()J").unwrap();
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.invoke_static(MAIN, "now", "()J")
            .stack(StackOp::Pop2)
            .return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    let mut table = builder.finish();
    let config = CullConfig::entry(MAIN, "main", DEFAULT_ENTRY_DESCRIPTOR);
    let report = cull(&mut table, &config).unwrap();
    lower_program(&table, &report, (MAIN, "main", DEFAULT_ENTRY_DESCRIPTOR)).unwrap()
}

#[test]
fn test_consistent_program_links() {
    let program = shapes_program();
    let report = check_linkage(&program).unwrap();

    assert!(report.emitted.contains("class__app_Derived"));
    assert!(report.emitted.contains(&program.entry_symbol));
    assert!(report.is_defined("classport_alloc_object"));
    assert!(report.native.is_empty());
    assert!(report.referenced > 0);
}

#[test]
fn test_native_without_source_is_a_gap() {
    let program = native_program();
    let now = method(&program, MAIN, "now").symbol.clone();
    let main = method(&program, MAIN, "main").qualified_name();

    match check_linkage(&program) {
        Err(TranslateError::LinkageGap {
            symbol,
            referenced_from,
        }) => {
            assert_eq!(symbol, now);
            assert_eq!(referenced_from, main);
        }
        other => panic!("expected a linkage gap, got {:?}", other),
    }
}

#[test]
fn test_native_source_closes_the_gap() {
    let mut program = native_program();
    let now = method(&program, MAIN, "now").symbol.clone();
    program.native_sources.push(NativeSource {
        path: PathBuf::from("native/clock.c"),
        contents: format!(
            "#include \"app_Main.h\"\nJAVA_LONG {}(CLASSPORT_THREAD_STATE* ts) {{ return 42; }}\n",
            now
        ),
    });

    let report = check_linkage(&program).unwrap();
    assert!(report.native.contains(&now));
    assert!(!report.emitted.contains(&now));
}

#[test]
fn test_missing_method_body_in_vtable_is_reported() {
    let mut program = shapes_program();
    let derived = program
        .classes
        .iter_mut()
        .find(|c| c.name == "app/Derived")
        .unwrap();
    derived.methods.retain(|m| m.name != "speak");

    let err = check_linkage(&program).unwrap_err();
    assert!(matches!(
        err,
        TranslateError::LinkageGap { ref referenced_from, .. } if referenced_from == "vtable of app/Derived"
    ));
}
