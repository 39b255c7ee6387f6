//! Managed threads: per-thread context, cooperative interruption, sleep and join.

use crate::state::ThreadState;
use crate::unwind::{Fault, Flow};
use crate::value::ObjRef;
use crate::lock;
use classport_core::RuntimeConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(5);

/// Everything the runtime tracks for one thread running translated code.
#[derive(Debug)]
pub struct ThreadContext {
    pub id: u64,
    pub name: String,
    state: Mutex<ThreadState>,
    interrupted: AtomicBool,
    thread_object: Mutex<Option<ObjRef>>,
    finished: Mutex<bool>,
    done: Condvar,
}

impl ThreadContext {
    pub fn new(id: u64, name: &str, config: &RuntimeConfig) -> Self {
        Self {
            id,
            name: name.to_string(),
            state: Mutex::new(ThreadState::new(config)),
            interrupted: AtomicBool::new(false),
            thread_object: Mutex::new(None),
            finished: Mutex::new(false),
            done: Condvar::new(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ThreadState> {
        lock(&self.state)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Reads and clears the interrupt flag.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    pub fn interrupt_flag(&self) -> &AtomicBool {
        &self.interrupted
    }

    pub fn thread_object(&self) -> Option<ObjRef> {
        *lock(&self.thread_object)
    }

    pub fn set_thread_object(&self, obj: ObjRef) {
        *lock(&self.thread_object) = Some(obj);
    }

    pub fn finish(&self) {
        *lock(&self.finished) = true;
        self.done.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *lock(&self.finished)
    }

    /// Blocks until this thread finishes. `waiter` is the interrupt flag of the joining thread.
    pub fn join(&self, waiter: &AtomicBool) -> Flow<()> {
        let mut finished = lock(&self.finished);
        while !*finished {
            if waiter.swap(false, Ordering::SeqCst) {
                return Err(Fault::Interrupted.into());
            }
            finished = self
                .done
                .wait_timeout(finished, POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}

/// Sleeps in short slices so an interrupt cuts the sleep short with `InterruptedException`.
pub fn sleep(duration: Duration, interrupted: &AtomicBool) -> Flow<()> {
    let deadline = Instant::now() + duration;
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            return Err(Fault::Interrupted.into());
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep(POLL.min(deadline - now));
    }
}
