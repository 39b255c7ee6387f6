use crate::monitor::MonitorTable;
use crate::unwind::{Fault, Unwind};
use crate::value::ObjRef;
use crate::RuntimeError;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_reentrant_enter_counts_holds() {
    let table = MonitorTable::new(16);
    let obj = ObjRef(1);
    table.enter(obj).unwrap();
    assert!(table.try_enter(obj).unwrap());
    assert_eq!(table.hold_count(obj), 2);

    table.exit(obj).unwrap();
    assert!(table.is_locked(obj));
    table.exit(obj).unwrap();
    assert!(!table.is_locked(obj));
    assert_eq!(table.hold_count(obj), 0);
}

#[test]
fn test_exit_without_owning_is_illegal() {
    let table = MonitorTable::new(16);
    let err = table.exit(ObjRef(3)).unwrap_err();
    assert!(matches!(err, Unwind::Fault(Fault::IllegalMonitorState)));
}

#[test]
fn test_contended_monitor_waits_for_full_release() {
    let table = Arc::new(MonitorTable::new(16));
    let obj = ObjRef(7);
    table.enter(obj).unwrap();
    table.enter(obj).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let worker = {
        let table = Arc::clone(&table);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            assert!(!table.try_enter(obj).unwrap());
            table.enter(obj).unwrap();
            acquired.store(true, Ordering::SeqCst);
            table.exit(obj).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(30));
    table.exit(obj).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(!acquired.load(Ordering::SeqCst));

    table.exit(obj).unwrap();
    worker.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_full_table_rejects_new_monitors() {
    let table = MonitorTable::new(1);
    table.enter(ObjRef(1)).unwrap();
    let err = table.try_enter(ObjRef(2)).unwrap_err();
    assert!(matches!(err, RuntimeError::MonitorTableFull(1)));
}

#[test]
fn test_wait_releases_and_reacquires() {
    let table = Arc::new(MonitorTable::new(16));
    let obj = ObjRef(5);
    let ready = Arc::new(AtomicBool::new(false));
    table.enter(obj).unwrap();
    table.enter(obj).unwrap();

    let notifier = {
        let table = Arc::clone(&table);
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            table.enter(obj).unwrap();
            ready.store(true, Ordering::SeqCst);
            table.notify(obj, false).unwrap();
            table.exit(obj).unwrap();
        })
    };

    let interrupted = AtomicBool::new(false);
    table.wait(obj, None, &interrupted).unwrap();
    notifier.join().unwrap();

    assert!(ready.load(Ordering::SeqCst));
    assert_eq!(table.hold_count(obj), 2);
}

#[test]
fn test_interrupted_wait_faults_and_keeps_monitor() {
    let table = MonitorTable::new(16);
    let obj = ObjRef(9);
    table.enter(obj).unwrap();
    let interrupted = AtomicBool::new(true);

    let err = table.wait(obj, None, &interrupted).unwrap_err();

    assert!(matches!(err, Unwind::Fault(Fault::Interrupted)));
    assert!(!interrupted.load(Ordering::SeqCst));
    assert_eq!(table.hold_count(obj), 1);
}

#[test]
fn test_timed_wait_returns_without_notify() {
    let table = MonitorTable::new(16);
    let obj = ObjRef(11);
    table.enter(obj).unwrap();
    let interrupted = AtomicBool::new(false);
    table
        .wait(obj, Some(Duration::from_millis(20)), &interrupted)
        .unwrap();
    assert_eq!(table.hold_count(obj), 1);
}

#[test]
fn test_notify_requires_ownership() {
    let table = MonitorTable::new(16);
    let obj = ObjRef(4);
    table.enter(obj).unwrap();
    table.exit(obj).unwrap();
    assert!(table.notify(obj, true).is_err());
}
