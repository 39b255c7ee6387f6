//! Process-wide runtime state shared by every managed thread.

use crate::heap::Heap;
use crate::monitor::MonitorTable;
use crate::threads::ThreadContext;
use crate::value::{ObjRef, Value};
use crate::lock;
use classport_core::RuntimeConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, ThreadId};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Running(ThreadId),
    Done,
}

/// What `begin_init` found for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitProgress {
    /// The caller must run the initializer now.
    Start,
    /// Done, or running on this thread already.
    Ready,
    /// Another thread is running the initializer.
    Busy,
}

#[derive(Debug, Default)]
struct Counters {
    collections: AtomicU64,
    freed: AtomicU64,
    overflows: AtomicU64,
    threads_started: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub collections: u64,
    pub freed: u64,
    pub overflows: u64,
    pub threads_started: u64,
    pub live_objects: usize,
    pub allocated: u64,
    pub monitors: usize,
}

#[derive(Debug)]
pub struct Runtime {
    pub config: RuntimeConfig,
    heap: Mutex<Heap>,
    pub monitors: MonitorTable,
    statics: Mutex<HashMap<String, Value>>,
    init: Mutex<HashMap<String, InitState>>,
    /// Interned strings and class objects; never collected.
    interned: Mutex<HashMap<String, ObjRef>>,
    class_objects: Mutex<HashMap<String, ObjRef>>,
    contexts: Mutex<HashMap<ThreadId, Arc<ThreadContext>>>,
    thread_objects: Mutex<HashMap<ObjRef, Arc<ThreadContext>>>,
    next_thread: AtomicU64,
    world: RwLock<()>,
    counters: Counters,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            monitors: MonitorTable::new(config.monitor_capacity),
            config,
            heap: Mutex::new(Heap::new()),
            statics: Mutex::new(HashMap::new()),
            init: Mutex::new(HashMap::new()),
            interned: Mutex::new(HashMap::new()),
            class_objects: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            thread_objects: Mutex::new(HashMap::new()),
            next_thread: AtomicU64::new(0),
            world: RwLock::new(()),
            counters: Counters::default(),
        }
    }

    pub fn heap(&self) -> MutexGuard<'_, Heap> {
        lock(&self.heap)
    }

    /// Held by a mutator while it runs statements.
    pub(crate) fn world(&self) -> RwLockReadGuard<'_, ()> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.heap().contains(obj)
    }

    pub fn intern(&self, text: &str) -> ObjRef {
        let mut interned = lock(&self.interned);
        if let Some(obj) = interned.get(text) {
            return *obj;
        }
        let obj = self.heap().alloc_string(text);
        interned.insert(text.to_string(), obj);
        obj
    }

    pub fn class_object(&self, class: &str) -> ObjRef {
        let mut objects = lock(&self.class_objects);
        if let Some(obj) = objects.get(class) {
            return *obj;
        }
        let obj = self.heap().alloc_class_object(class);
        objects.insert(class.to_string(), obj);
        obj
    }

    pub fn static_value(&self, symbol: &str) -> Option<Value> {
        lock(&self.statics).get(symbol).copied()
    }

    pub fn set_static(&self, symbol: &str, value: Value) {
        lock(&self.statics).insert(symbol.to_string(), value);
    }

    /// Claims the initializer of `class` for the current thread if nobody has started it.
    pub fn begin_init(&self, class: &str) -> InitProgress {
        let me = thread::current().id();
        let mut init = lock(&self.init);
        match init.get(class) {
            None => {
                init.insert(class.to_string(), InitState::Running(me));
                InitProgress::Start
            }
            Some(InitState::Done) => InitProgress::Ready,
            Some(InitState::Running(owner)) if *owner == me => InitProgress::Ready,
            Some(InitState::Running(_)) => InitProgress::Busy,
        }
    }

    pub fn finish_init(&self, class: &str) {
        lock(&self.init).insert(class.to_string(), InitState::Done);
        debug!(class, "class initialized");
    }

    /// The context of the calling thread, created on first use.
    pub fn current_thread(&self) -> Arc<ThreadContext> {
        let me = thread::current().id();
        let mut contexts = lock(&self.contexts);
        if let Some(ctx) = contexts.get(&me) {
            return Arc::clone(ctx);
        }
        let name = thread::current().name().unwrap_or("main").to_string();
        let ctx = Arc::new(self.new_context(&name));
        debug!(thread = ctx.id, name = %ctx.name, "thread state created");
        contexts.insert(me, Arc::clone(&ctx));
        ctx
    }

    pub fn new_context(&self, name: &str) -> ThreadContext {
        let id = self.next_thread.fetch_add(1, Ordering::SeqCst);
        ThreadContext::new(id, name, &self.config)
    }

    /// Makes `ctx` the context of the calling thread.
    pub fn attach(&self, ctx: Arc<ThreadContext>) {
        lock(&self.contexts).insert(thread::current().id(), ctx);
        self.counters.threads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Tears down the calling thread's context.
    pub fn detach(&self) {
        if let Some(ctx) = lock(&self.contexts).remove(&thread::current().id()) {
            if let Some(obj) = ctx.thread_object() {
                lock(&self.thread_objects).remove(&obj);
            }
            ctx.finish();
            debug!(thread = ctx.id, "thread state released");
        }
    }

    pub fn bind_thread_object(&self, obj: ObjRef, ctx: Arc<ThreadContext>) {
        ctx.set_thread_object(obj);
        lock(&self.thread_objects).insert(obj, ctx);
    }

    pub fn thread_for(&self, obj: ObjRef) -> Option<Arc<ThreadContext>> {
        lock(&self.thread_objects).get(&obj).cloned()
    }

    pub(crate) fn count_overflow(&self) {
        self.counters.overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Stops the world, marks from every root and frees the rest. Must not be called by a thread
    /// that is in the middle of running statements.
    pub fn collect(&self) -> usize {
        let _world = self.world.write().unwrap_or_else(PoisonError::into_inner);
        let mut roots: Vec<ObjRef> = Vec::new();
        let contexts: Vec<Arc<ThreadContext>> = lock(&self.contexts).values().cloned().collect();
        let bound: Vec<(ObjRef, Arc<ThreadContext>)> = lock(&self.thread_objects)
            .iter()
            .map(|(obj, ctx)| (*obj, Arc::clone(ctx)))
            .collect();
        for ctx in contexts.iter().chain(bound.iter().map(|(_, ctx)| ctx)) {
            roots.extend(ctx.state().roots());
            roots.extend(ctx.thread_object());
        }
        roots.extend(bound.iter().map(|(obj, _)| *obj));
        roots.extend(lock(&self.statics).values().filter_map(Value::reference));
        roots.extend(lock(&self.interned).values().copied());
        roots.extend(lock(&self.class_objects).values().copied());

        let freed = self.heap().collect(roots);
        for obj in &freed {
            self.monitors.forget(*obj);
        }
        self.counters.collections.fetch_add(1, Ordering::Relaxed);
        self.counters
            .freed
            .fetch_add(freed.len() as u64, Ordering::Relaxed);
        info!(freed = freed.len(), live = self.heap().live(), "collection complete");
        freed.len()
    }

    pub fn stats(&self) -> RuntimeStats {
        let heap = self.heap();
        RuntimeStats {
            collections: self.counters.collections.load(Ordering::Relaxed),
            freed: self.counters.freed.load(Ordering::Relaxed),
            overflows: self.counters.overflows.load(Ordering::Relaxed),
            threads_started: self.counters.threads_started.load(Ordering::Relaxed),
            live_objects: heap.live(),
            allocated: heap.allocated(),
            monitors: self.monitors.len(),
        }
    }
}
