use super::fixtures::{entry_config, shapes_table, MAIN};
use crate::analysis::{cull, LiveReason};
use crate::builder::TableBuilder;
use crate::config::{CullConfig, NativeSource, DEFAULT_ENTRY_DESCRIPTOR};
use crate::TranslateError;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_unreachable_class_is_eliminated() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();

    assert!(table.get("app/Unused").unwrap().eliminated);
    assert!(!table.get("app/Used").unwrap().eliminated);
    assert!(!table.get(MAIN).unwrap().eliminated);
    assert!(report.eliminated_classes.contains(&"app/Unused".to_string()));
    assert!(report.is_live("app/Used.work()V"));
}

#[test]
fn test_uninstantiated_override_is_eliminated() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();

    let derived = table.get("app/Derived").unwrap();
    assert!(!derived.find_method("speak", "()V").unwrap().1.eliminated);
    assert!(table.get("app/Other").unwrap().eliminated);
    assert!(matches!(
        report.reason("app/Derived.speak()V"),
        Some(LiveReason::Override(_))
    ));
}

#[test]
fn test_cull_is_idempotent() {
    let mut table = shapes_table().unwrap();
    let first = cull(&mut table, &entry_config()).unwrap();
    let second = cull(&mut table, &entry_config()).unwrap();

    assert_eq!(first.live_set(), second.live_set());
    assert_eq!(first.live_classes, second.live_classes);
    assert_eq!(first.eliminated_methods, second.eliminated_methods);
}

#[test]
fn test_explain_reaches_a_root() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();

    let chain = report.explain("app/Used").unwrap();
    assert!(chain.first().unwrap().starts_with("app/Used"));
    assert!(chain.last().unwrap().contains("entry point"));
    assert!(report.explain("app/Unused").is_none());
}

#[test]
fn test_effectively_final_classes() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();

    assert!(report.effectively_final.contains("app/Derived"));
    assert!(!report.effectively_final.contains("app/Base"));
}

#[test]
fn test_keep_class_retains_every_method() {
    let mut table = shapes_table().unwrap();
    let config = entry_config().keep("app/Unused");
    let report = cull(&mut table, &config).unwrap();

    let unused = table.get("app/Unused").unwrap();
    assert!(!unused.eliminated);
    assert!(unused.methods.iter().all(|m| !m.eliminated));
    assert_eq!(report.reason("app/Unused"), Some(&LiveReason::KeepClass));
}

#[test]
fn test_native_source_reference_keeps_method() {
    let mut table = shapes_table().unwrap();
    let native = NativeSource {
        path: PathBuf::from("glue.c"),
        contents: "void hook(void) { app_Unused___INIT____(0); }".to_string(),
    };
    let config = entry_config().with_native_sources(vec![native]);
    let report = cull(&mut table, &config).unwrap();

    assert_eq!(
        report.reason("app/Unused.<init>()V"),
        Some(&LiveReason::NativeReference)
    );
    assert!(!table.get("app/Unused").unwrap().eliminated);
}

#[test]
fn test_missing_entry_point() {
    let mut table = shapes_table().unwrap();

    let err = cull(&mut table, &CullConfig::entry("app/Nope", "main", DEFAULT_ENTRY_DESCRIPTOR))
        .unwrap_err();
    assert!(matches!(err, TranslateError::ClassNotFound(_)));

    let err = cull(&mut table, &CullConfig::entry(MAIN, "start", "()V")).unwrap_err();
    assert!(matches!(err, TranslateError::EntryPointNotFound { .. }));
}

#[test]
fn test_unresolved_references_are_reported() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.invoke_static("lib/Missing", "call", "()V").return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    let mut table = builder.finish();
    let report = cull(&mut table, &entry_config()).unwrap();

    assert!(!report.unresolved.is_empty());
    assert!(report
        .unresolved
        .iter()
        .all(|(from, class)| from.starts_with(MAIN) && class == "lib/Missing"));
}

#[test]
fn test_cull_scales_to_thousands_of_classes() {
    const CHAIN: usize = 3000;
    const DEAD: usize = 2000;
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.invoke_static("gen/C0", "run", "()V").return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    for i in 0..CHAIN {
        let name = format!("gen/C{}", i);
        let mut class = builder.class(&name);
        class.default_constructor().unwrap();
        let mut m = class.static_method("run", "()V");
        if i + 1 < CHAIN {
            m.invoke_static(&format!("gen/C{}", i + 1), "run", "()V");
        }
        m.return_void();
        m.build().unwrap();
        class.build().unwrap();
    }
    for i in 0..DEAD {
        let mut class = builder.class(&format!("dead/D{}", i));
        class.default_constructor().unwrap();
        class.build().unwrap();
    }
    let mut table = builder.finish();

    let report = cull(&mut table, &entry_config()).unwrap();
    assert_eq!(report.live_classes.len(), CHAIN + 1);
    assert_eq!(report.eliminated_classes.len(), DEAD);
    assert!(report.duration < Duration::from_secs(5));
}

#[test]
fn test_every_live_class_is_needed() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();
    assert!(report.unresolved.is_empty());

    for class in &report.live_classes {
        let chain = report.explain(class).unwrap();
        assert!(chain.last().unwrap().contains("entry point"), "{:?}", chain);
    }

    for class in report.live_classes.iter().filter(|c| *c != MAIN) {
        let mut reduced = shapes_table().unwrap();
        reduced.remove(class).unwrap();
        let report = cull(&mut reduced, &entry_config()).unwrap();
        assert!(
            report.unresolved.iter().any(|(_, missing)| missing == class),
            "removing {} left nothing unresolved",
            class
        );
    }
}

#[test]
fn test_static_initializer_of_live_class_is_live() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.getstatic("app/Config", "limit", "I").pop().return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut config = builder.class("app/Config");
        config.static_field("limit", "I").unwrap();
        let mut clinit = config.static_method("<clinit>", "()V");
        clinit
            .iconst(8)
            .putstatic("app/Config", "limit", "I")
            .return_void();
        clinit.build().unwrap();
        let mut m = config.static_method("reset", "()V");
        m.return_void();
        m.build().unwrap();
        config.build().unwrap();
    }
    let mut table = builder.finish();
    let report = cull(&mut table, &entry_config()).unwrap();

    assert!(report.is_live("app/Config"));
    assert!(report.is_live("app/Config.<clinit>()V"));
    assert!(!report.is_live("app/Config.reset()V"));
    let config = table.get("app/Config").unwrap();
    assert!(!config.find_method("<clinit>", "()V").unwrap().1.eliminated);
}

#[test]
fn test_interface_call_keeps_only_instantiated_implementors() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.construct("app/Circle")
            .pop()
            .aconst_null()
            .invoke_static(MAIN, "measure", "(Lapp/Shape;)I")
            .pop()
            .return_void();
        m.build().unwrap();
        let mut m = main.static_method("measure", "(Lapp/Shape;)I");
        m.aload(0)
            .invoke_interface("app/Shape", "area", "()I")
            .ireturn();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut shape = builder.class("app/Shape");
        shape.interface().abstract_method("area", "()I").unwrap();
        shape.build().unwrap();
    }
    for name in ["app/Circle", "app/Square"] {
        let mut class = builder.class(name);
        class.implements("app/Shape").default_constructor().unwrap();
        let mut m = class.method("area", "()I");
        m.iconst(1).ireturn();
        m.build().unwrap();
        class.build().unwrap();
    }
    let mut table = builder.finish();
    let report = cull(&mut table, &entry_config()).unwrap();

    assert!(report.is_live("app/Shape"));
    assert!(report.is_live("app/Shape.area()I"));
    assert!(report.is_live("app/Circle.area()I"));
    assert!(table.get("app/Square").unwrap().eliminated);
    assert!(!report.is_live("app/Square.area()I"));
    assert!(report.eliminated_classes.contains(&"app/Square".to_string()));
}
