use super::fixtures::{call, call_int, call_throws, executor, single_class, with_main, MAIN};
use crate::{Outcome, Program, Value};
use classport_core::codegen::runtime_contract as rc;
use classport_core::instructions::{ArithOp, ArrayElem, BranchOperands, Condition};
use classport_core::{ConstantValue, JavaType, RuntimeConfig, ValueKind};
use pretty_assertions::assert_eq;

#[test]
fn test_arithmetic_and_branches() {
    let exec = single_class(|c| {
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
    assert_eq!(call_int(&exec, "max", "(II)I", vec![Value::Int(3), Value::Int(9)]), 9);
    assert_eq!(call_int(&exec, "max", "(II)I", vec![Value::Int(-2), Value::Int(-7)]), -2);
}

#[test]
fn test_integer_division_by_zero_throws() {
    let exec = single_class(|c| {
        let mut m = c.static_method("divide", "(II)I");
        m.iload(0).iload(1).idiv().ireturn();
        m.build()
    });
    assert_eq!(
        call_int(&exec, "divide", "(II)I", vec![Value::Int(i32::MIN), Value::Int(-1)]),
        i32::MIN
    );
    let (class, message) = call_throws(&exec, "divide", "(II)I", vec![Value::Int(1), Value::Int(0)]);
    assert_eq!(class, rc::ARITHMETIC_EXCEPTION);
    assert_eq!(message.as_deref(), Some("/ by zero"));
}

#[test]
fn test_long_arithmetic_wraps() {
    let exec = single_class(|c| {
        let mut m = c.static_method("shift", "(JI)J");
        m.lload(0)
            .iload(2)
            .arith(ValueKind::Long, ArithOp::Shl)
            .lreturn();
        m.build()
    });
    let outcome = call(&exec, "shift", "(JI)J", vec![Value::Long(1), Value::Int(65)]);
    assert_eq!(outcome, Outcome::Returned(Some(Value::Long(2))));
}

#[test]
fn test_lookup_switch_selects_by_key() {
    let exec = single_class(|c| {
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
        m.build()
    });
    let pick = |key| call_int(&exec, "pick", "(I)I", vec![Value::Int(key)]);
    assert_eq!(pick(4), 1);
    assert_eq!(pick(10), 2);
    for key in [0, 5, 11, -5] {
        assert_eq!(pick(key), 0, "key {}", key);
    }
}

#[test]
fn test_table_switch_covers_its_range() {
    let exec = single_class(|c| {
        let mut m = c.static_method("day", "(I)I");
        m.iload(0)
            .tableswitch(1, &["mon", "tue", "wed"], "none")
            .label("mon")
            .iconst(10)
            .ireturn()
            .label("tue")
            .iconst(20)
            .ireturn()
            .label("wed")
            .iconst(30)
            .ireturn()
            .label("none")
            .iconst(-1)
            .ireturn();
        m.build()
    });
    let day = |key| call_int(&exec, "day", "(I)I", vec![Value::Int(key)]);
    assert_eq!((day(1), day(2), day(3)), (10, 20, 30));
    assert_eq!((day(0), day(4)), (-1, -1));
}

#[test]
fn test_increment_matches_generic_add_at_bounds() {
    let deltas: [i16; 6] = [1, -1, 127, -128, 32767, -32768];
    let exec = single_class(|c| {
        for (i, delta) in deltas.iter().enumerate() {
            let mut inc = c.static_method(&format!("inc{}", i), "(I)I");
            inc.iinc(0, *delta).iload(0).ireturn();
            inc.build()?;
            let mut add = c.static_method(&format!("add{}", i), "(I)I");
            add.iload(0).iconst(i32::from(*delta)).iadd().ireturn();
            add.build()?;
        }
        Ok(())
    });
    for i in 0..deltas.len() {
        for input in [i32::MAX, i32::MIN, 0, -1, 1000] {
            let args = vec![Value::Int(input)];
            let inc = call_int(&exec, &format!("inc{}", i), "(I)I", args.clone());
            let add = call_int(&exec, &format!("add{}", i), "(I)I", args);
            assert_eq!(inc, add, "delta {} on {}", deltas[i], input);
        }
    }
}

#[test]
fn test_stack_overflow_is_caught_once_and_recovers() {
    let config = RuntimeConfig {
        max_call_depth: 64,
        ..RuntimeConfig::default()
    };
    let exec = executor(config, |b| {
        with_main(b, |c| {
            let mut recurse = c.static_method("recurse", "(I)I");
            recurse
                .iload(0)
                .iconst(1)
                .iadd()
                .invoke_static(MAIN, "recurse", "(I)I")
                .ireturn();
            recurse.build()?;

            let mut bounded = c.static_method("bounded", "(I)I");
            bounded
                .iload(0)
                .if_zero(Condition::Eq, "zero")
                .iload(0)
                .iload(0)
                .iconst(1)
                .isub()
                .invoke_static(MAIN, "bounded", "(I)I")
                .iadd()
                .ireturn()
                .label("zero")
                .iconst(0)
                .ireturn();
            bounded.build()?;

            let mut probe = c.static_method("probe", "()I");
            probe
                .iconst(0)
                .istore(0)
                .label("try")
                .iconst(0)
                .invoke_static(MAIN, "recurse", "(I)I")
                .pop()
                .label("end")
                .goto("after")
                .label("handler")
                .pop()
                .iinc(0, 1)
                .label("after")
                .iload(0)
                .iconst(1000)
                .imul()
                .iconst(10)
                .invoke_static(MAIN, "bounded", "(I)I")
                .iadd()
                .ireturn()
                .handler("try", "end", "handler", Some(rc::STACK_OVERFLOW_ERROR));
            probe.build()
        })
    });

    assert_eq!(call_int(&exec, "probe", "()I", vec![]), 1055);
    assert_eq!(exec.runtime().current_thread().state().depth(), 0);
    assert_eq!(exec.runtime().stats().overflows, 1);
}

#[test]
fn test_uncaught_overflow_leaves_depth_at_zero() {
    let config = RuntimeConfig {
        max_call_depth: 32,
        ..RuntimeConfig::default()
    };
    let exec = executor(config, |b| {
        with_main(b, |c| {
            let mut m = c.static_method("forever", "()V");
            m.invoke_static(MAIN, "forever", "()V").return_void();
            m.build()
        })
    });
    let (class, _) = call_throws(&exec, "forever", "()V", vec![]);
    assert_eq!(class, rc::STACK_OVERFLOW_ERROR);
    let ctx = exec.runtime().current_thread();
    let state = ctx.state();
    assert_eq!(state.depth(), 0);
    assert_eq!(state.pending_exception, None);
}

#[test]
fn test_two_dimensional_array_round_trip() {
    let exec = single_class(|c| {
        let mut m = c.static_method("grid", "(II)I");
        m.iload(0)
            .iload(1)
            .multianewarray(JavaType::parse("[[I").unwrap(), 2)
            .astore(2)
            .aload(2)
            .iconst(1)
            .array_load(ArrayElem::Ref)
            .iconst(2)
            .iconst(42)
            .array_store(ArrayElem::Int)
            .aload(2)
            .iconst(1)
            .array_load(ArrayElem::Ref)
            .iconst(2)
            .array_load(ArrayElem::Int)
            .ireturn();
        m.build()
    });
    let args = |outer, inner| vec![Value::Int(outer), Value::Int(inner)];

    assert_eq!(call_int(&exec, "grid", "(II)I", args(3, 4)), 42);

    let (class, message) = call_throws(&exec, "grid", "(II)I", args(1, 4));
    assert_eq!(class, rc::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION);
    assert_eq!(message.as_deref(), Some("Index 1 out of bounds for length 1"));

    let (class, _) = call_throws(&exec, "grid", "(II)I", args(2, -1));
    assert_eq!(class, rc::NEGATIVE_ARRAY_SIZE_EXCEPTION);
}

#[test]
fn test_handler_catches_subclass_of_catch_type() {
    let exec = single_class(|c| {
        let mut m = c.static_method("guarded", "([I)I");
        m.label("try")
            .aload(0)
            .arraylength()
            .ireturn()
            .label("end")
            .label("npe")
            .pop()
            .iconst(-1)
            .ireturn()
            .handler("try", "end", "npe", Some("java/lang/RuntimeException"));
        m.build()
    });
    assert_eq!(call_int(&exec, "guarded", "([I)I", vec![crate::value::NULL]), -1);
}

#[test]
fn test_static_initializer_runs_once() {
    let exec = single_class(|c| {
        c.static_field("counter", "I")?;
        let mut clinit = c.static_method("<clinit>", "()V");
        clinit
            .getstatic(MAIN, "counter", "I")
            .iconst(41)
            .iadd()
            .putstatic(MAIN, "counter", "I")
            .return_void();
        clinit.build()?;
        let mut read = c.static_method("read", "()I");
        read.getstatic(MAIN, "counter", "I").ireturn();
        read.build()
    });
    assert_eq!(call_int(&exec, "read", "()I", vec![]), 41);
    assert_eq!(call_int(&exec, "read", "()I", vec![]), 41);
}

#[test]
fn test_constant_fields_start_initialized() {
    let exec = single_class(|c| {
        c.constant_field("LIMIT", ConstantValue::Int(12))?;
        let mut m = c.static_method("limit", "()I");
        m.getstatic(MAIN, "LIMIT", "I").ireturn();
        m.build()
    });
    assert_eq!(call_int(&exec, "limit", "()I", vec![]), 12);
}

#[test]
fn test_synchronized_method_releases_monitor_on_throw() {
    let exec = single_class(|c| {
        let mut m = c.static_method("boom", "()I");
        m.synchronized().iconst(1).iconst(0).idiv().ireturn();
        m.build()?;
        let mut ok = c.static_method("fine", "()I");
        ok.synchronized().iconst(5).ireturn();
        ok.build()
    });
    let monitor = exec.runtime().class_object(MAIN);

    assert_eq!(call_int(&exec, "fine", "()I", vec![]), 5);
    assert!(!exec.runtime().monitors.is_locked(monitor));

    let (class, _) = call_throws(&exec, "boom", "()I", vec![]);
    assert_eq!(class, rc::ARITHMETIC_EXCEPTION);
    assert!(!exec.runtime().monitors.is_locked(monitor));
}

#[test]
fn test_virtual_and_interface_dispatch() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut virt = c.static_method("speak", "()I");
            virt.construct("app/Derived")
                .invoke_virtual("app/Base", "speak", "()I")
                .construct("app/Base")
                .invoke_virtual("app/Base", "speak", "()I")
                .imul()
                .ireturn();
            virt.build()?;
            let mut iface = c.static_method("area", "()I");
            iface
                .construct("app/Square")
                .invoke_interface("app/Shape", "area", "()I")
                .ireturn();
            iface.build()
        })?;
        {
            let mut base = b.class("app/Base");
            base.default_constructor()?;
            let mut m = base.method("speak", "()I");
            m.iconst(3).ireturn();
            m.build()?;
            base.build()?;
        }
        {
            let mut derived = b.class("app/Derived");
            derived.extends("app/Base").default_constructor()?;
            let mut m = derived.method("speak", "()I");
            m.iconst(7).ireturn();
            m.build()?;
            derived.build()?;
        }
        {
            let mut shape = b.class("app/Shape");
            shape.interface().abstract_method("area", "()I")?;
            shape.build()?;
        }
        {
            let mut square = b.class("app/Square");
            square.implements("app/Shape").default_constructor()?;
            let mut m = square.method("area", "()I");
            m.iconst(16).ireturn();
            m.build()?;
            square.build()?;
        }
        Ok(())
    });
    assert_eq!(call_int(&exec, "speak", "()I", vec![]), 21);
    assert_eq!(call_int(&exec, "area", "()I", vec![]), 16);
}

#[test]
fn test_failed_cast_throws_class_cast() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut m = c.static_method("cast", "()V");
            m.construct("app/Thing")
                .checkcast("java/lang/String")
                .pop()
                .return_void();
            m.build()?;
            let mut test = c.static_method("test", "()I");
            test.construct("app/Thing").instanceof("app/Thing").ireturn();
            test.build()
        })?;
        let mut thing = b.class("app/Thing");
        thing.default_constructor()?;
        thing.build()?;
        Ok(())
    });
    let (class, message) = call_throws(&exec, "cast", "()V", vec![]);
    assert_eq!(class, rc::CLASS_CAST_EXCEPTION);
    assert_eq!(
        message.as_deref(),
        Some("class app.Thing cannot be cast to class java.lang.String")
    );
    assert_eq!(call_int(&exec, "test", "()I", vec![]), 1);
}

#[test]
fn test_registered_native_is_called() {
    let exec = single_class(|c| {
        c.native_method("twice", "(I)I")?;
        let mut m = c.static_method("useNative", "()I");
        m.iconst(21).invoke_static(MAIN, "twice", "(I)I").ireturn();
        m.build()
    });
    let symbol = Program::symbol_of(MAIN, "twice", "(I)I").unwrap();
    exec.register_native(&symbol, |call| Ok(Some(Value::Int(call.int(0)? * 2))));
    assert_eq!(call_int(&exec, "useNative", "()I", vec![]), 42);
}

#[test]
fn test_missing_native_is_a_runtime_error() {
    let exec = single_class(|c| {
        c.native_method("absent", "()V")?;
        let mut m = c.static_method("callAbsent", "()V");
        m.invoke_static(MAIN, "absent", "()V").return_void();
        m.build()
    });
    let err = exec.invoke_static(MAIN, "callAbsent", "()V", vec![]).unwrap_err();
    assert!(matches!(err, crate::RuntimeError::MissingNative(_)));
}

#[test]
fn test_string_constants_are_interned() {
    let exec = single_class(|c| {
        let mut m = c.static_method("same", "()I");
        m.sconst("hello")
            .sconst("hello")
            .branch(Condition::Eq, BranchOperands::RefPair, "same")
            .iconst(0)
            .ireturn()
            .label("same")
            .iconst(1)
            .ireturn();
        m.build()
    });
    assert_eq!(call_int(&exec, "same", "()I", vec![]), 1);
    assert_eq!(
        exec.run_entry(vec![crate::value::NULL]).unwrap(),
        Outcome::Returned(None)
    );
}

#[test]
fn test_body_monitor_is_released_when_exception_escapes() {
    let exec = single_class(|c| {
        let mut m = c.static_method("lockAndFail", "(Ljava/lang/Object;)I");
        m.aload(0).monitorenter().iconst(1).iconst(0).idiv().ireturn();
        m.build()
    });
    let monitor = exec.runtime().class_object(MAIN);

    let (class, _) = call_throws(
        &exec,
        "lockAndFail",
        "(Ljava/lang/Object;)I",
        vec![Value::object(monitor)],
    );
    assert_eq!(class, rc::ARITHMETIC_EXCEPTION);
    assert!(!exec.runtime().monitors.is_locked(monitor));

    let runtime = std::sync::Arc::clone(exec.runtime());
    let acquired = std::thread::spawn(move || {
        let acquired = runtime.monitors.try_enter(monitor).unwrap();
        if acquired {
            runtime.monitors.exit(monitor).unwrap();
        }
        acquired
    })
    .join()
    .unwrap();
    assert!(acquired);
}

#[test]
fn test_abstract_call_throws_abstract_method_error() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut m = c.static_method("callShape", "()I");
            m.construct("app/Circle")
                .invoke_interface("app/Shape", "area", "()I")
                .ireturn();
            m.build()?;
            let mut guarded = c.static_method("guarded", "()I");
            guarded
                .label("try")
                .invoke_static(MAIN, "callShape", "()I")
                .ireturn()
                .label("end")
                .pop()
                .iconst(-1)
                .ireturn()
                .handler("try", "end", "end", Some(rc::ABSTRACT_METHOD_ERROR));
            guarded.build()
        })?;
        {
            let mut shape = b.class("app/Shape");
            shape.interface().abstract_method("area", "()I")?;
            shape.build()?;
        }
        let mut circle = b.class("app/Circle");
        circle.implements("app/Shape").default_constructor()?;
        circle.build()?;
        Ok(())
    });

    let (class, message) = call_throws(&exec, "callShape", "()I", vec![]);
    assert_eq!(class, rc::ABSTRACT_METHOD_ERROR);
    assert_eq!(message.as_deref(), Some("app.Circle.area()I"));
    assert_eq!(call_int(&exec, "guarded", "()I", vec![]), -1);
}

#[test]
fn test_negative_timeouts_throw_illegal_argument() {
    let exec = single_class(|c| {
        let mut sleep = c.static_method("nap", "(J)V");
        sleep
            .lload(0)
            .invoke_static(rc::THREAD, "sleep", "(J)V")
            .return_void();
        sleep.build()?;
        let mut wait = c.static_method("pause", "(Ljava/lang/Object;J)V");
        wait.aload(0)
            .lload(1)
            .invoke_virtual(rc::OBJECT, "wait", "(J)V")
            .return_void();
        wait.build()
    });

    let (class, message) = call_throws(&exec, "nap", "(J)V", vec![Value::Long(-1)]);
    assert_eq!(class, rc::ILLEGAL_ARGUMENT_EXCEPTION);
    assert_eq!(message.as_deref(), Some("timeout value is negative"));

    // rejected before the monitor ownership check
    let monitor = exec.runtime().class_object(MAIN);
    let (class, _) = call_throws(
        &exec,
        "pause",
        "(Ljava/lang/Object;J)V",
        vec![Value::object(monitor), Value::Long(-5)],
    );
    assert_eq!(class, rc::ILLEGAL_ARGUMENT_EXCEPTION);
    assert!(!exec.runtime().monitors.is_locked(monitor));

    assert_eq!(call(&exec, "nap", "(J)V", vec![Value::Long(0)]), Outcome::Returned(None));
}
