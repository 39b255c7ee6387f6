use super::fixtures::{method, render_method, single_class, MAIN};
use crate::config::{EmitterConfig, VerbosityLevel};
use crate::emitter::Emitter;
use crate::method_body::MethodEmitter;
use crate::tables::SharedTables;
use classport_core::instructions::Condition;
use classport_core::{JavaType, RuntimeConfig, ValueKind};
use pretty_assertions::assert_eq;

#[test]
fn test_iinc_becomes_one_increment_line() {
    let program = single_class(|c| {
        let mut m = c.static_method("bump", "(I)I");
        m.iinc(0, 1).iload(0).ireturn();
        m.build()
    });
    let text = render_method(&program, "bump", &EmitterConfig::default());

    assert!(text.contains("JAVA_INT app_Main_bump__int_R_int(CLASSPORT_THREAD_STATE* ts, JAVA_INT p0)"));
    assert!(text.contains("locals[0].v.i = cp_iadd(locals[0].v.i, 1);"));
    assert!(text.contains("CP_SET_I(0, p0);"));
    assert!(text.contains("if (locals == NULL) return 0;"));
    assert!(!text.contains("JAVA_INT pc"));
}

#[test]
fn test_frame_claims_locals_and_stack_slots() {
    let program = single_class(|c| {
        let mut m = c.static_method("wide", "(JI)J");
        m.max_locals(4).max_stack(2).lload(0).lreturn();
        m.build()
    });
    let text = render_method(&program, "wide", &EmitterConfig::default());

    assert!(text.contains("CP_SLOT* locals = classport_enter_method(ts, 6);"));
    assert!(text.contains("stack = locals + 4;"));
    // the long takes slots 0 and 1, so the int lands in slot 2
    assert!(text.contains("CP_SET_L(0, p0);"));
    assert!(text.contains("CP_SET_I(2, p1);"));
    assert!(text.contains("CP_PUSH_L(locals[0].v.l);"));
    assert!(text.contains("JAVA_LONG r = CP_POP_L();"));
    assert!(text.contains("classport_leave_method(ts, locals);"));
}

#[test]
fn test_integer_division_checks_for_zero() {
    let program = single_class(|c| {
        let mut m = c.static_method("div", "(II)I");
        m.iload(0).iload(1).idiv().ireturn();
        m.build()
    });
    let text = render_method(&program, "div", &EmitterConfig::default());

    let pop_b = text.find("JAVA_INT b = CP_POP_I();").unwrap();
    let pop_a = text.find("JAVA_INT a = CP_POP_I();").unwrap();
    let check = text.find("CP_ZERO_CHECK(b);").unwrap();
    let push = text.find("CP_PUSH_I(cp_idiv(a, b));").unwrap();
    assert!(pop_b < pop_a && pop_a < check && check < push);
}

#[test]
fn test_switch_keeps_minimum_key() {
    let program = single_class(|c| {
        let mut m = c.static_method("pick", "(I)I");
        m.iload(0)
            .lookupswitch(&[(i32::MIN, "low"), (5, "five")], "other")
            .label("low")
            .iconst(1)
            .ireturn()
            .label("five")
            .iconst(2)
            .ireturn()
            .label("other")
            .iconst(0)
            .ireturn();
        m.build()
    });
    let text = render_method(&program, "pick", &EmitterConfig::default());

    assert!(text.contains("switch (key) {"));
    assert!(text.contains("case (-2147483647 - 1): goto L_2;"));
    assert!(text.contains("case 5: goto L_4;"));
    assert!(text.contains("default: goto L_6;"));
    for label in ["L_2:", "L_4:", "L_6:"] {
        assert!(text.contains(label), "missing {}", label);
    }
}

#[test]
fn test_branch_pops_into_temporaries() {
    let program = single_class(|c| {
        let mut m = c.static_method("max", "(II)I");
        m.iload(0)
            .iload(1)
            .if_icmp(Condition::Lt, "second")
            .iload(0)
            .ireturn()
            .label("second")
            .iload(1)
            .ireturn();
        m.build()
    });
    let text = render_method(&program, "max", &EmitterConfig::default());

    assert!(text.contains("if (a < b) goto L_5;"));
    assert!(!text.contains("CP_PUSH_I(CP_POP"));
}

#[test]
fn test_handler_dispatch_in_unwind_block() {
    let program = single_class(|c| {
        let mut m = c.static_method("safe", "(II)I");
        m.label("start")
            .iload(0)
            .iload(1)
            .idiv()
            .ireturn()
            .label("end")
            .pop()
            .iconst(0)
            .ireturn()
            .handler("start", "end", "end", Some("java/lang/ArithmeticException"));
        m.build()
    });
    let tables = SharedTables::build(&program);
    let config = EmitterConfig::default();
    let text = MethodEmitter::new(&tables, &config)
        .emit_to_string(method(&program, MAIN, "safe"))
        .unwrap();
    let index = tables
        .type_index(&JavaType::object("java/lang/ArithmeticException"))
        .unwrap();

    assert!(text.contains("JAVA_INT pc = -1;"));
    assert!(text.contains("pc = 2;"));
    assert!(text.contains(&format!(
        "if (pc >= 0 && pc < 4 && classport_instanceof(ts, exception, &classport_types[{}])) {{",
        index
    )));
    assert!(text.contains("ts->pending_exception = NULL;"));
    assert!(text.contains("goto L_4;"));
    assert!(text.contains("cp_unwind:"));
}

#[test]
fn test_synchronized_instance_method_tracks_monitor() {
    let program = single_class(|c| {
        let mut m = c.method("locked", "()I");
        m.synchronized().iconst(1).ireturn();
        m.build()
    });
    let text = render_method(&program, "locked", &EmitterConfig::default());

    assert!(text.contains("JAVA_INT monitor_held = 0;"));
    assert!(text.contains("classport_monitor_enter(ts, self);"));
    assert!(text.contains("monitor_held = 1;"));
    assert!(text.contains("if (monitor_held) classport_monitor_exit(ts, self);"));
    assert!(text.contains("CP_SET_O(0, self);"));
}

#[test]
fn test_synchronized_static_method_locks_class_literal() {
    let program = single_class(|c| {
        let mut m = c.static_method("tick", "()V");
        m.synchronized().return_void();
        m.build()
    });
    let tables = SharedTables::build(&program);
    let index = tables.type_index(&JavaType::object(MAIN)).unwrap();
    let text = render_method(&program, "tick", &EmitterConfig::default());

    assert!(text.contains(&format!(
        "classport_monitor_enter(ts, classport_class_literal(ts, &classport_types[{}]));",
        index
    )));
}

#[test]
fn test_null_checks_follow_runtime_config() {
    let build = || {
        single_class(|c| {
            c.field("count", "I")?;
            let mut m = c.static_method("count", "(Lapp/Main;)I");
            m.aload(0).getfield(MAIN, "count", "I").ireturn();
            m.build()
        })
    };
    let checked = render_method(&build(), "count", &EmitterConfig::default());
    assert!(checked.contains("CP_NULL_CHECK(obj);"));
    assert!(checked.contains("CP_PUSH_I(((struct app_Main_object*) obj)->f_count);"));

    let config = EmitterConfig {
        runtime: RuntimeConfig {
            null_checks: false,
            ..RuntimeConfig::default()
        },
        ..EmitterConfig::default()
    };
    let unchecked = render_method(&build(), "count", &config);
    assert!(!unchecked.contains("CP_NULL_CHECK"));
}

#[test]
fn test_string_constant_goes_through_runtime() {
    let program = single_class(|c| {
        let mut m = c.static_method("greet", "()Ljava/lang/String;");
        m.sconst("hi").areturn();
        m.build()
    });
    let text = render_method(&program, "greet", &EmitterConfig::default());
    let index = program.string_index("hi").unwrap();

    assert!(text.contains(&format!(
        "JAVA_OBJECT s = classport_string_constant(ts, {});",
        index
    )));
    assert!(text.contains("if (locals == NULL) return NULL;"));
}

#[test]
fn test_debug_verbosity_comments_statements() {
    let program = single_class(|c| {
        let mut m = c.static_method("one", "()I");
        m.iconst(1).ireturn();
        m.build()
    });
    let config = EmitterConfig {
        verbosity: VerbosityLevel::Debug,
        ..EmitterConfig::default()
    };
    let text = render_method(&program, "one", &config);
    assert!(text.contains("/* Push(Int(1)) */"));
    assert!(text.contains("max_locals 0, 0 handlers */"));

    let quiet = EmitterConfig {
        verbosity: VerbosityLevel::Quiet,
        ..EmitterConfig::default()
    };
    let text = render_method(&program, "one", &quiet);
    assert!(text.starts_with("JAVA_INT app_Main_one___R_int"));
}

#[test]
fn test_native_method_has_no_body() {
    let program = single_class(|c| {
        c.native_method("now", "()J")?;
        Ok(())
    });
    let tables = SharedTables::build(&program);
    let config = EmitterConfig::default();
    let result = MethodEmitter::new(&tables, &config).emit_to_string(method(&program, MAIN, "now"));
    assert!(result.is_err());
}

#[test]
fn test_prologue_faults_fall_outside_handler_ranges() {
    let program = single_class(|c| {
        let mut init = c.static_method("<clinit>", "()V");
        init.return_void();
        init.build()?;
        let mut m = c.static_method("guarded", "()I");
        m.synchronized()
            .label("start")
            .iconst(1)
            .ireturn()
            .label("end")
            .pop()
            .iconst(0)
            .ireturn()
            .handler("start", "end", "end", None);
        m.build()
    });
    let text = render_method(&program, "guarded", &EmitterConfig::default());

    let declared = text.find("JAVA_INT pc = -1;").unwrap();
    let init = text.find("classport_class_init(ts, ").unwrap();
    let lock = text.find("classport_monitor_enter(ts, ").unwrap();
    let first_pc = text.find("pc = 0;").unwrap();
    assert!(declared < init && init < lock && lock < first_pc);
    assert!(text.contains("if (pc >= 0 && pc < 2) {"));
}

#[test]
fn test_unwind_releases_body_monitors_before_leaving() {
    let program = single_class(|c| {
        let mut m = c.static_method("lockAndFail", "(Ljava/lang/Object;)I");
        m.aload(0).monitorenter().iconst(1).iconst(0).idiv().ireturn();
        m.build()
    });
    let text = render_method(&program, "lockAndFail", &EmitterConfig::default());

    let unwind = &text[text.find("cp_unwind:").unwrap()..];
    let release = unwind
        .find("classport_release_frame_monitors(ts, locals);")
        .unwrap();
    let leave = unwind.find("classport_leave_method(ts, locals);").unwrap();
    assert!(release < leave);
    assert!(unwind.contains("return 0;"));
}
