/*! Object monitors.
 *
 * A bounded side table maps an object to its monitor. The table's own lock is held only for the
 * lookup; each monitor then has its own lock and condition variable. Monitors are reentrant: the
 * owner may enter again, and must exit as many times before another thread can acquire.
 * `wait` releases every hold the caller has and restores the same count once reacquired.
 */

use crate::unwind::{Fault, Flow};
use crate::value::ObjRef;
use crate::{lock, Result, RuntimeError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// How often a waiting thread looks at its interrupt flag.
const POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    count: usize,
    waiting: usize,
    /// Notifications not yet consumed by a waiter.
    permits: usize,
}

#[derive(Debug, Default)]
struct Monitor {
    state: Mutex<MonitorState>,
    changed: Condvar,
}

impl Monitor {
    fn park<'a>(
        &self,
        guard: MutexGuard<'a, MonitorState>,
        timeout: Duration,
    ) -> MutexGuard<'a, MonitorState> {
        self.changed
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }
}

#[derive(Debug)]
pub struct MonitorTable {
    monitors: Mutex<HashMap<ObjRef, Arc<Monitor>>>,
    capacity: usize,
}

impl MonitorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn monitor(&self, obj: ObjRef) -> Result<Arc<Monitor>> {
        let mut monitors = lock(&self.monitors);
        if let Some(monitor) = monitors.get(&obj) {
            return Ok(Arc::clone(monitor));
        }
        if monitors.len() >= self.capacity {
            return Err(RuntimeError::MonitorTableFull(self.capacity));
        }
        let monitor = Arc::new(Monitor::default());
        monitors.insert(obj, Arc::clone(&monitor));
        Ok(monitor)
    }

    fn existing(&self, obj: ObjRef) -> Option<Arc<Monitor>> {
        lock(&self.monitors).get(&obj).cloned()
    }

    /// Acquires without blocking. Returns false if another thread owns the monitor.
    pub fn try_enter(&self, obj: ObjRef) -> Result<bool> {
        let monitor = self.monitor(obj)?;
        let me = thread::current().id();
        let mut state = lock(&monitor.state);
        match state.owner {
            None => {
                state.owner = Some(me);
                state.count = 1;
                Ok(true)
            }
            Some(owner) if owner == me => {
                state.count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Acquires, blocking until the current owner has fully exited.
    pub fn enter(&self, obj: ObjRef) -> Result<()> {
        let monitor = self.monitor(obj)?;
        let me = thread::current().id();
        let mut state = lock(&monitor.state);
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.count = 1;
                    return Ok(());
                }
                Some(owner) if owner == me => {
                    state.count += 1;
                    return Ok(());
                }
                Some(_) => {
                    state = monitor
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner)
                }
            }
        }
    }

    pub fn exit(&self, obj: ObjRef) -> Flow<()> {
        let monitor = self.existing(obj).ok_or(Fault::IllegalMonitorState)?;
        let mut state = lock(&monitor.state);
        if state.owner != Some(thread::current().id()) {
            return Err(Fault::IllegalMonitorState.into());
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            monitor.changed.notify_all();
        }
        Ok(())
    }

    /// Holds the current thread has on `obj`.
    pub fn hold_count(&self, obj: ObjRef) -> usize {
        let Some(monitor) = self.existing(obj) else {
            return 0;
        };
        let state = lock(&monitor.state);
        if state.owner == Some(thread::current().id()) {
            state.count
        } else {
            0
        }
    }

    pub fn is_locked(&self, obj: ObjRef) -> bool {
        match self.existing(obj) {
            Some(monitor) => {
                let state = lock(&monitor.state);
                state.owner.is_some()
            }
            None => false,
        }
    }

    /// Releases the monitor fully, waits for a notification, the timeout or an interrupt, then
    /// reacquires it with the original hold count.
    pub fn wait(&self, obj: ObjRef, timeout: Option<Duration>, interrupted: &AtomicBool) -> Flow<()> {
        let monitor = self.existing(obj).ok_or(Fault::IllegalMonitorState)?;
        let me = thread::current().id();
        let mut state = lock(&monitor.state);
        if state.owner != Some(me) {
            return Err(Fault::IllegalMonitorState.into());
        }
        let saved = state.count;
        state.owner = None;
        state.count = 0;
        state.waiting += 1;
        monitor.changed.notify_all();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut outcome = Ok(());
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                break;
            }
            if interrupted.swap(false, Ordering::SeqCst) {
                outcome = Err(Fault::Interrupted.into());
                break;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    POLL.min(deadline - now)
                }
                None => POLL,
            };
            state = monitor.park(state, slice);
        }
        state.waiting -= 1;

        while state.owner.is_some() {
            state = monitor.park(state, POLL);
        }
        state.owner = Some(me);
        state.count = saved;
        outcome
    }

    /// Wakes one waiter, or all of them.
    pub fn notify(&self, obj: ObjRef, all: bool) -> Flow<()> {
        let monitor = self.existing(obj).ok_or(Fault::IllegalMonitorState)?;
        let mut state = lock(&monitor.state);
        if state.owner != Some(thread::current().id()) {
            return Err(Fault::IllegalMonitorState.into());
        }
        state.permits = if all {
            state.waiting
        } else {
            (state.permits + 1).min(state.waiting)
        };
        monitor.changed.notify_all();
        Ok(())
    }

    /// Drops the entry of a freed object, unless some thread still holds or waits on it.
    pub fn forget(&self, obj: ObjRef) {
        let mut monitors = lock(&self.monitors);
        let idle = monitors.get(&obj).map(|m| {
            let state = lock(&m.state);
            state.owner.is_none() && state.waiting == 0
        });
        if idle == Some(true) {
            monitors.remove(&obj);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.monitors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
