use super::fixtures::{entry_config, shapes_table, MAIN};
use crate::analysis::cull;
use crate::builder::TableBuilder;
use crate::codegen::{runtime_contract, DispatchTables};
use crate::config::DEFAULT_ENTRY_DESCRIPTOR;
use crate::method::MethodKey;
use pretty_assertions::assert_eq;

#[test]
fn test_vtables_are_prefix_compatible() {
    let mut table = shapes_table().unwrap();
    cull(&mut table, &entry_config()).unwrap();
    let tables = DispatchTables::build(&table);

    let object = tables.get(runtime_contract::OBJECT).unwrap();
    let base = tables.get("app/Base").unwrap();
    let derived = tables.get("app/Derived").unwrap();
    assert_eq!(object.class_id, 0);
    for (slot, entry) in object.vtable.iter().enumerate() {
        assert_eq!(base.vtable[slot].key, entry.key);
        assert_eq!(derived.vtable[slot].key, entry.key);
    }

    let speak = MethodKey::new("speak", "()V");
    assert_eq!(base.slot_of(&speak), derived.slot_of(&speak));
    assert_eq!(tables.lookup("app/Base", &speak), Some("app_Base_speak__"));
    assert_eq!(tables.lookup("app/Derived", &speak), Some("app_Derived_speak__"));
    assert!(tables.get("app/Other").is_none());
}

#[test]
fn test_interface_default_fills_missing_slot() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut greeter = builder.class("app/Greeter");
        greeter.interface();
        let mut m = greeter.method("greet", "()V");
        m.return_void();
        m.build().unwrap();
        greeter.abstract_method("name", "()Ljava/lang/String;").unwrap();
        greeter.build().unwrap();
    }
    {
        let mut english = builder.class("app/English");
        english.implements("app/Greeter").default_constructor().unwrap();
        english.build().unwrap();
    }
    let mut table = builder.finish();
    let config = entry_config().keep("app/Greeter").keep("app/English");
    cull(&mut table, &config).unwrap();
    let tables = DispatchTables::build(&table);

    let greet = MethodKey::new("greet", "()V");
    let name = MethodKey::new("name", "()Ljava/lang/String;");
    assert_eq!(tables.lookup("app/English", &greet), Some("app_Greeter_greet__"));
    assert!(tables.slot_of("app/English", &name).is_some());
    assert_eq!(tables.lookup("app/English", &name), None);
    assert_eq!(
        tables.get("app/English").unwrap().interfaces,
        vec!["app/Greeter".to_string()]
    );
}

#[test]
fn test_runtime_thread_run_is_overridable() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut worker = builder.class("app/Worker");
        worker.extends(runtime_contract::THREAD).default_constructor().unwrap();
        let mut run = worker.method("run", "()V");
        run.return_void();
        run.build().unwrap();
        worker.build().unwrap();
    }
    let mut table = builder.finish();
    cull(&mut table, &entry_config().keep("app/Worker")).unwrap();
    let tables = DispatchTables::build(&table);

    let run = MethodKey::new("run", "()V");
    assert_eq!(
        tables.slot_of(runtime_contract::THREAD, &run),
        tables.slot_of("app/Worker", &run)
    );
    assert_eq!(tables.lookup("app/Worker", &run), Some("app_Worker_run__"));
    assert_eq!(
        tables.lookup(runtime_contract::THREAD, &run),
        Some("java_lang_Thread_run__")
    );
}
