use super::fixtures::{call_int, executor, with_main, MAIN};
use crate::Executor;
use classport_core::codegen::runtime_contract as rc;
use classport_core::instructions::{BranchOperands, Condition};
use classport_core::{JavaType, RuntimeConfig, TableBuilder};
use pretty_assertions::assert_eq;

/// `app/Worker` extends `Thread`; its `run` executes `body` and then stores 7 into `Main.result`.
fn worker_program(fail: bool) -> Executor {
    executor(RuntimeConfig::default(), |b: &mut TableBuilder| {
        with_main(b, |c| {
            c.static_field("result", "I")?;
            let mut m = c.static_method("spawn", "()I");
            m.construct("app/Worker")
                .astore(0)
                .aload(0)
                .invoke_virtual(rc::THREAD, "start", "()V")
                .aload(0)
                .invoke_virtual(rc::THREAD, "join", "()V")
                .getstatic(MAIN, "result", "I")
                .ireturn();
            m.build()
        })?;
        let mut worker = b.class("app/Worker");
        worker.extends(rc::THREAD).default_constructor()?;
        let mut run = worker.method("run", "()V");
        if fail {
            run.iconst(1).iconst(0).idiv().pop();
        }
        run.iconst(7).putstatic(MAIN, "result", "I").return_void();
        run.build()?;
        worker.build()?;
        Ok(())
    })
}

#[test]
fn test_started_thread_runs_and_joins() {
    let exec = worker_program(false);
    assert_eq!(call_int(&exec, "spawn", "()I", vec![]), 7);
    assert_eq!(exec.runtime().stats().threads_started, 1);
}

#[test]
fn test_uncaught_exception_ends_only_its_thread() {
    let exec = worker_program(true);
    assert_eq!(call_int(&exec, "spawn", "()I", vec![]), 0);
}

#[test]
fn test_current_thread_is_stable() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut m = c.static_method("same", "()I");
            m.invoke_static(rc::THREAD, "currentThread", "()Ljava/lang/Thread;")
                .invoke_static(rc::THREAD, "currentThread", "()Ljava/lang/Thread;")
                .branch(Condition::Eq, BranchOperands::RefPair, "same")
                .iconst(0)
                .ireturn()
                .label("same")
                .iconst(1)
                .ireturn();
            m.build()
        })
    });
    assert_eq!(call_int(&exec, "same", "()I", vec![]), 1);
}

#[test]
fn test_gc_request_frees_dropped_arrays() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut m = c.static_method("churn", "()I");
            for _ in 0..3 {
                m.iconst(100).newarray(JavaType::Int).pop();
            }
            m.iconst(4)
                .newarray(JavaType::Long)
                .astore(0)
                .invoke_static("java/lang/System", "gc", "()V")
                .aload(0)
                .arraylength()
                .ireturn();
            m.build()
        })
    });
    assert_eq!(call_int(&exec, "churn", "()I", vec![]), 4);
    let stats = exec.runtime().stats();
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.freed, 3);
}

#[test]
fn test_interrupt_flag_is_cleared_by_interrupted() {
    let exec = executor(RuntimeConfig::default(), |b| {
        with_main(b, |c| {
            let mut m = c.static_method("check", "()I");
            m.invoke_static(rc::THREAD, "currentThread", "()Ljava/lang/Thread;")
                .invoke_virtual(rc::THREAD, "interrupt", "()V")
                .invoke_static(rc::THREAD, "interrupted", "()Z")
                .iconst(10)
                .imul()
                .invoke_static(rc::THREAD, "interrupted", "()Z")
                .iadd()
                .ireturn();
            m.build()
        })
    });
    assert_eq!(call_int(&exec, "check", "()I", vec![]), 10);
}
