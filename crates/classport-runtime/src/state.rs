/*! Per-thread runtime state.
 *
 * Holds the call-depth counter, the pre-allocated window of value slots that frames carve their
 * locals and operand stacks out of, the pending exception and the pending-allocation roots. The
 * collector reads all of it while the world is stopped.
 */

use crate::value::{ObjRef, Value};
use crate::{Result, RuntimeError};
use classport_core::RuntimeConfig;

/// One activation of a lowered method.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    /// Index into the program's method list.
    pub method: usize,
    /// Position over prologue statements followed by body statements.
    pub pc: usize,
    pub base: usize,
    pub stack_base: usize,
    pub sp: usize,
    /// Monitor taken by a synchronized method's prologue.
    pub monitor: Option<ObjRef>,
    /// Monitors taken by `monitorenter` in this activation and not yet released.
    pub entered: Vec<ObjRef>,
    /// Class whose static initializer this frame runs.
    pub init: Option<String>,
}

#[derive(Debug)]
pub struct ThreadState {
    depth: usize,
    max_depth: usize,
    slots: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub pending_exception: Option<ObjRef>,
    pending: Vec<ObjRef>,
    pending_capacity: usize,
}

impl ThreadState {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            depth: 0,
            max_depth: config.max_call_depth,
            slots: vec![Value::default(); config.object_stack_size],
            frames: Vec::new(),
            pending_exception: None,
            pending: Vec::with_capacity(config.pending_allocations),
            pending_capacity: config.pending_allocations,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Counts a method entry. Fails, leaving the counter untouched, once the limit is reached.
    pub fn enter_method(&mut self) -> bool {
        if self.depth >= self.max_depth {
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn leave_method(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Roots an object that is not yet stored anywhere the collector can see.
    pub fn track_pending(&mut self, obj: ObjRef) -> Result<()> {
        if self.pending.len() >= self.pending_capacity {
            return Err(RuntimeError::PendingWindowFull(self.pending_capacity));
        }
        self.pending.push(obj);
        Ok(())
    }

    pub fn release_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> &[ObjRef] {
        &self.pending
    }

    pub fn window(&self) -> usize {
        self.slots.len()
    }

    /// First free slot above the innermost frame.
    pub(crate) fn top(&self) -> usize {
        self.frames.last().map_or(0, |f| f.sp)
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or(RuntimeError::NoFrame)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or(RuntimeError::NoFrame)
    }

    pub(crate) fn slot(&self, index: usize) -> Result<Value> {
        self.slots
            .get(index)
            .copied()
            .ok_or(RuntimeError::StackWindowExhausted(self.slots.len()))
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) -> Result<()> {
        let window = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RuntimeError::StackWindowExhausted(window))?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        let sp = self.frame()?.sp;
        self.set_slot(sp, value)?;
        self.frame_mut()?.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self, method: &str) -> Result<Value> {
        let frame = self.frame_mut()?;
        if frame.sp <= frame.stack_base {
            return Err(RuntimeError::StackUnderflow(method.to_string()));
        }
        frame.sp -= 1;
        let sp = frame.sp;
        self.slot(sp)
    }

    pub fn peek(&self, depth: usize) -> Result<Value> {
        let frame = self.frame()?;
        let index = frame
            .sp
            .checked_sub(depth + 1)
            .filter(|i| *i >= frame.stack_base)
            .ok_or(RuntimeError::NoFrame)?;
        self.slot(index)
    }

    pub fn local(&self, slot: u16) -> Result<Value> {
        let base = self.frame()?.base;
        self.slot(base + slot as usize)
    }

    pub fn set_local(&mut self, slot: u16, value: Value) -> Result<()> {
        let base = self.frame()?.base;
        self.set_slot(base + slot as usize, value)
    }

    /// Every object this thread keeps alive.
    pub fn roots(&self) -> Vec<ObjRef> {
        let mut roots: Vec<ObjRef> = self.slots[..self.top().min(self.slots.len())]
            .iter()
            .filter_map(Value::reference)
            .collect();
        for frame in &self.frames {
            roots.extend(frame.monitor);
            roots.extend(frame.entered.iter().copied());
        }
        roots.extend(self.pending_exception);
        roots.extend(self.pending.iter().copied());
        roots
    }
}
