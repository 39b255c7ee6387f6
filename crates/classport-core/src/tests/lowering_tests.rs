use super::fixtures::{entry_config, shapes_table, single_class, MAIN};
use crate::analysis::cull;
use crate::builder::TableBuilder;
use crate::class_table::ClassTable;
use crate::codegen::{lower_program, Dispatch, LoweredMethod, LoweredProgram, Stmt};
use crate::config::DEFAULT_ENTRY_DESCRIPTOR;
use crate::instructions::Instruction;
use crate::method::MethodKey;
use crate::values::{ConstantValue, ValueKind};
use crate::TranslateError;
use pretty_assertions::assert_eq;

const ENTRY: (&str, &str, &str) = (MAIN, "main", DEFAULT_ENTRY_DESCRIPTOR);

fn lower_kept(mut table: ClassTable) -> LoweredProgram {
    let report = cull(&mut table, &entry_config().keep(MAIN)).unwrap();
    lower_program(&table, &report, ENTRY).unwrap()
}

fn method<'p>(program: &'p LoweredProgram, class: &str, name: &str) -> &'p LoweredMethod {
    program
        .class(class)
        .unwrap()
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap()
}

fn calls(method: &LoweredMethod) -> Vec<&crate::codegen::Call> {
    method
        .body
        .iter()
        .filter_map(|s| match &s.stmt {
            Stmt::Invoke(call) => Some(call),
            _ => None,
        })
        .collect()
}

#[test]
fn test_iinc_lowers_to_single_increment() {
    let table = single_class(|c| {
        let mut m = c.static_method("bump", "(I)I");
        m.iload(0)
            .iconst(1)
            .iadd()
            .istore(0)
            .iinc(0, 1)
            .iload(0)
            .ireturn();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);
    let bump = method(&program, MAIN, "bump");

    assert_eq!(
        bump.count_stmts(|s| matches!(s, Stmt::IncLocal { slot: 0, delta: 1 })),
        1
    );
    assert_eq!(bump.count_stmts(|s| matches!(s, Stmt::Binary { .. })), 1);
}

#[test]
fn test_switch_keys_are_preserved() {
    let table = single_class(|c| {
        let mut m = c.static_method("pick", "(I)I");
        m.iload(0)
            .lookupswitch(&[(4, "four"), (10, "ten")], "other")
            .label("four")
            .iconst(1)
            .ireturn()
            .label("ten")
            .iconst(2)
            .ireturn()
            .label("other")
            .iconst(0)
            .ireturn();
        m.build()?;
        let mut t = c.static_method("dense", "(I)I");
        t.iload(0)
            .tableswitch(-1, &["a", "b", "a"], "d")
            .label("a")
            .iconst(1)
            .ireturn()
            .label("b")
            .iconst(2)
            .ireturn()
            .label("d")
            .iconst(0)
            .ireturn();
        t.build()
    })
    .unwrap();
    let program = lower_kept(table);

    let pick = method(&program, MAIN, "pick");
    let Stmt::Switch { cases, default } = &pick.body[1].stmt else {
        panic!("expected switch, got {:?}", pick.body[1].stmt);
    };
    assert_eq!(cases, &vec![(4, 2), (10, 4)]);
    assert_eq!(*default, 6);
    assert!(pick.jump_targets.contains(&6));

    let dense = method(&program, MAIN, "dense");
    let Stmt::Switch { cases, .. } = &dense.body[1].stmt else {
        panic!("expected switch");
    };
    let keys: Vec<i32> = cases.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![-1, 0, 1]);
}

#[test]
fn test_virtual_call_through_base_uses_vtable_slot() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();
    let program = lower_program(&table, &report, ENTRY).unwrap();

    let main = method(&program, MAIN, "main");
    let speak = calls(main)
        .into_iter()
        .find(|c| c.key.name == "speak")
        .unwrap();
    let key = MethodKey::new("speak", "()V");
    let expected = program.dispatch.slot_of("app/Base", &key).unwrap();
    assert_eq!(speak.dispatch, Dispatch::Virtual { slot: expected });
    assert_eq!(program.dispatch.slot_of("app/Derived", &key), Some(expected));
    assert!(speak.has_receiver);
}

#[test]
fn test_call_on_effectively_final_class_is_direct() {
    let mut builder = TableBuilder::new();
    {
        let mut main = builder.class(MAIN);
        let mut m = main.static_method("main", DEFAULT_ENTRY_DESCRIPTOR);
        m.construct("app/Leaf")
            .invoke_virtual("app/Leaf", "size", "()I")
            .pop()
            .return_void();
        m.build().unwrap();
        main.build().unwrap();
    }
    {
        let mut leaf = builder.class("app/Leaf");
        leaf.default_constructor().unwrap();
        let mut m = leaf.method("size", "()I");
        m.iconst(3).ireturn();
        m.build().unwrap();
        leaf.build().unwrap();
    }
    let mut table = builder.finish();
    let report = cull(&mut table, &entry_config()).unwrap();
    let program = lower_program(&table, &report, ENTRY).unwrap();

    let main = method(&program, MAIN, "main");
    let size = calls(main)
        .into_iter()
        .find(|c| c.key.name == "size")
        .unwrap();
    assert_eq!(
        size.dispatch,
        Dispatch::Direct {
            symbol: "app_Leaf_size___R_int".to_string()
        }
    );
    assert!(main.referenced_symbols.contains("app_Leaf_size___R_int"));
}

#[test]
fn test_synchronized_method_releases_before_every_return() {
    let table = single_class(|c| {
        let mut m = c.method("locked", "(I)I");
        m.synchronized()
            .iload(1)
            .if_zero(crate::instructions::Condition::Eq, "zero")
            .iconst(1)
            .ireturn()
            .label("zero")
            .iconst(0)
            .ireturn();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);
    let locked = method(&program, MAIN, "locked");

    assert_eq!(locked.prologue, vec![Stmt::MethodMonitorEnter]);
    let returns: Vec<usize> = locked
        .body
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s.stmt, Stmt::Return(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(returns.len(), 2);
    for index in returns {
        assert_eq!(locked.body[index - 1].stmt, Stmt::MethodMonitorExit);
    }
}

#[test]
fn test_static_method_initializes_its_class_first() {
    let table = single_class(|c| {
        c.static_field("counter", "I")?;
        let mut clinit = c.static_method("<clinit>", "()V");
        clinit
            .iconst(7)
            .putstatic(MAIN, "counter", "I")
            .return_void();
        clinit.build()?;
        let mut get = c.static_method("get", "()I");
        get.getstatic(MAIN, "counter", "I").ireturn();
        get.build()
    })
    .unwrap();
    let program = lower_kept(table);

    let get = method(&program, MAIN, "get");
    assert_eq!(get.prologue, vec![Stmt::ClassInit(MAIN.to_string())]);
    let clinit = method(&program, MAIN, "<clinit>");
    assert!(clinit.prologue.is_empty());
    let class = program.class(MAIN).unwrap();
    assert_eq!(class.clinit_symbol.as_deref(), Some("app_Main___CLINIT____"));
    assert_eq!(class.static_fields[0].symbol, "STATIC_FIELD_app_Main_counter");
}

#[test]
fn test_string_constants_are_interned_once() {
    let table = single_class(|c| {
        let mut m = c.static_method("greet", "()V");
        m.sconst("hi").pop().sconst("hi").pop().sconst("bye").pop().return_void();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);

    assert_eq!(program.strings, vec!["hi".to_string(), "bye".to_string()]);
    let greet = method(&program, MAIN, "greet");
    assert_eq!(
        greet.body[0].stmt,
        Stmt::Push(ConstantValue::String("hi".to_string()))
    );
}

#[test]
fn test_reference_to_culled_class_is_an_error() {
    let mut table = shapes_table().unwrap();
    let report = cull(&mut table, &entry_config()).unwrap();
    table.get_mut("app/Used").unwrap().eliminated = true;

    let err = lower_program(&table, &report, ENTRY).unwrap_err();
    assert!(matches!(
        err,
        TranslateError::DanglingReferenceAfterCull { ref reference, .. } if reference == "app/Used"
    ));
}

#[test]
fn test_invokedynamic_is_unsupported() {
    let table = single_class(|c| {
        let mut m = c.static_method("lambda", "()V");
        m.op(Instruction::InvokeDynamic {
            name: "run".to_string(),
            descriptor: "()Ljava/lang/Runnable;".to_string(),
            bootstrap: 0,
        })
        .pop()
        .return_void();
        m.build()
    });
    let mut table = table.unwrap();
    let report = cull(&mut table, &entry_config().keep(MAIN)).unwrap();
    let err = lower_program(&table, &report, ENTRY).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedInstruction { .. }));
}

#[test]
fn test_missing_owner_keeps_mangled_symbol() {
    let table = single_class(|c| {
        let mut m = c.static_method("external", "()V");
        m.lconst(5).invoke_static("lib/Native", "poke", "(J)V").return_void();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);
    let external = method(&program, MAIN, "external");

    assert!(external.referenced_symbols.contains("lib_Native_poke__long"));
    assert!(!program.defined_symbols().contains("lib_Native_poke__long"));
}

#[test]
fn test_dup2_on_long_copies_one_entry() {
    let table = single_class(|c| {
        let mut m = c.static_method("twice", "(J)J");
        m.lload(0)
            .stack(crate::instructions::StackOp::Dup2)
            .arith(ValueKind::Long, crate::instructions::ArithOp::Add)
            .lreturn();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);
    let twice = method(&program, MAIN, "twice");
    assert_eq!(twice.body[1].stmt, Stmt::Dup { count: 1, depth: 0 });
}

#[test]
fn test_frame_size_comes_from_declared_max_stack() {
    let table = single_class(|c| {
        let mut m = c.static_method("roomy", "()I");
        m.max_stack(6).iconst(1).ireturn();
        m.build()
    })
    .unwrap();
    let program = lower_kept(table);
    assert_eq!(method(&program, MAIN, "roomy").max_stack, 6);

    let mut table = single_class(|c| {
        let mut m = c.static_method("cramped", "()I");
        m.max_stack(1).iconst(1).iconst(2).iadd().ireturn();
        m.build()
    })
    .unwrap();
    let report = cull(&mut table, &entry_config().keep(MAIN)).unwrap();
    let err = lower_program(&table, &report, ENTRY).unwrap_err();
    assert!(matches!(err, TranslateError::Verification { .. }));
}
