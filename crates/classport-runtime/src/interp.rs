/*! Reference executor for lowered statements.
 *
 * Frames live in the calling thread's [`ThreadState`]: each activation carves its locals and
 * operand stack out of the pre-allocated slot window, so the executor itself never recurses.
 * Method entry bumps the depth counter and fails with a catchable `StackOverflowError` at the
 * limit; every exit path, normal or exceptional, decrements it again.
 *
 * Statements run in slices under the world read lock. Anything that can block (a contended
 * monitor, `wait`, `sleep`, `join`, a collection request) ends the slice, runs with no runtime
 * lock held and then resumes the frame.
 */

use crate::natives::{NativeCall, NativeFn};
use crate::program::{Builtin, Program};
use crate::runtime::{InitProgress, Runtime};
use crate::state::{Frame, ThreadState};
use crate::threads::{self, ThreadContext};
use crate::unwind::{Fault, Flow, Unwind};
use crate::value::{ObjRef, Value, NULL};
use crate::{lock, Result, RuntimeError};
use classport_core::codegen::runtime_contract as rc;
use classport_core::codegen::{Call, Dispatch, LoweredMethod, Stmt};
use classport_core::instructions::{ArithOp, BranchOperands, CompareOp, Condition, NarrowKind};
use classport_core::{ConstantValue, JavaType, MethodKey, RuntimeConfig, ValueKind};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Statements run per world-lock acquisition.
const SLICE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Returned(Option<Value>),
    /// An exception escaped the invoked method.
    Threw(ObjRef),
}

#[derive(Debug)]
enum BlockOp {
    Monitor { obj: ObjRef, method: bool },
    Wait { obj: ObjRef, timeout: Option<Duration> },
    Sleep(Duration),
    Join(ObjRef),
    Gc,
    InitBusy,
}

#[derive(Debug)]
enum Resumed {
    Advance,
    Entered { obj: ObjRef, method: bool },
    Retry,
    Fault(Fault),
    Fatal(RuntimeError),
}

impl From<Flow<()>> for Resumed {
    fn from(flow: Flow<()>) -> Self {
        match flow {
            Ok(()) => Resumed::Advance,
            Err(Unwind::Fault(fault)) => Resumed::Fault(fault),
            Err(Unwind::Fatal(error)) => Resumed::Fatal(error),
            Err(Unwind::Thrown(obj)) => Resumed::Fatal(RuntimeError::WrongObjectKind {
                obj,
                expected: "a fault",
            }),
        }
    }
}

enum Step {
    Next,
    Jump(u32),
    /// A frame was pushed; the current statement resumes once it returns.
    Stay,
    Return(Option<Value>),
    Block(BlockOp),
}

enum Called {
    Frame,
    Value(Option<Value>),
    Block(BlockOp),
}

enum Action {
    Continue,
    Done(Outcome),
    Block(BlockOp),
}

#[derive(Clone)]
pub struct Executor {
    program: Arc<Program>,
    runtime: Arc<Runtime>,
    natives: Arc<Mutex<HashMap<String, NativeFn>>>,
}

impl Executor {
    /// Sets up the runtime and the initial value of every static field.
    pub fn new(program: Program, config: RuntimeConfig) -> Self {
        let runtime = Runtime::new(config);
        for (_, field) in &program.statics {
            let zero = Value::zero(field.ty.value_kind().unwrap_or(ValueKind::Int));
            let value = match &field.constant {
                Some(ConstantValue::String(text)) => Value::object(runtime.intern(text)),
                Some(constant) => Value::from_constant(constant).unwrap_or(zero),
                None => zero,
            };
            runtime.set_static(&field.symbol, value);
        }
        Self {
            program: Arc::new(program),
            runtime: Arc::new(runtime),
            natives: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn register_native(
        &self,
        symbol: &str,
        native: impl Fn(&mut NativeCall<'_>) -> Flow<Option<Value>> + Send + Sync + 'static,
    ) {
        lock(&self.natives).insert(symbol.to_string(), Arc::new(native));
    }

    pub fn run_entry(&self, args: Vec<Value>) -> Result<Outcome> {
        let entry = self.program.entry_symbol.clone();
        self.invoke(&entry, args)
    }

    pub fn invoke_static(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Outcome> {
        let symbol = Program::symbol_of(class, name, descriptor)
            .ok_or_else(|| RuntimeError::UnresolvedSymbol(format!("{}.{}{}", class, name, descriptor)))?;
        self.invoke(&symbol, args)
    }

    /// Runs `symbol` to completion on the calling thread.
    pub fn invoke(&self, symbol: &str, args: Vec<Value>) -> Result<Outcome> {
        let ctx = self.runtime.current_thread();
        self.run_on(&ctx, symbol, args)
    }

    pub fn class_of(&self, obj: ObjRef) -> Result<String> {
        Ok(self.runtime.heap().class_of(obj)?.to_string())
    }

    /// The detail message of a throwable, if it has one.
    pub fn message(&self, obj: ObjRef) -> Result<Option<String>> {
        let index = self.detail_message_index()?;
        let heap = self.runtime.heap();
        match heap.field(obj, index)?.as_ref()? {
            Some(text) => Ok(Some(heap.string(text)?.to_string())),
            None => Ok(None),
        }
    }

    pub fn describe(&self, obj: ObjRef) -> String {
        let class = self.class_of(obj).unwrap_or_else(|_| "<freed>".to_string());
        match self.message(obj) {
            Ok(Some(message)) => format!("{}: {}", class.replace('/', "."), message),
            _ => class.replace('/', "."),
        }
    }

    fn method(&self, index: usize) -> Result<&LoweredMethod> {
        self.program
            .method(index)
            .ok_or_else(|| RuntimeError::UnresolvedSymbol(format!("method #{}", index)))
    }

    fn field_index(&self, owner: &str, name: &str) -> Result<usize> {
        self.program
            .class(owner)
            .and_then(|c| c.field_index(owner, name))
            .ok_or_else(|| RuntimeError::UnknownField {
                class: owner.to_string(),
                field: name.to_string(),
            })
    }

    fn detail_message_index(&self) -> Result<usize> {
        self.field_index(rc::THROWABLE, "detailMessage")
    }

    fn run_on(&self, ctx: &Arc<ThreadContext>, symbol: &str, args: Vec<Value>) -> Result<Outcome> {
        let floor;
        let mut action = {
            let _world = self.runtime.world();
            let mut state = ctx.state();
            floor = state.frames.len();
            match self.call(ctx, &mut state, symbol, args) {
                Ok(Called::Frame) => Action::Continue,
                Ok(Called::Value(value)) => Action::Done(Outcome::Returned(value)),
                Ok(Called::Block(op)) => Action::Block(op),
                Err(unwind) => {
                    let exc = self.throwable(&mut state, unwind)?;
                    Action::Done(Outcome::Threw(exc))
                }
            }
        };
        loop {
            action = match action {
                Action::Done(outcome) => return Ok(outcome),
                Action::Continue => {
                    let _world = self.runtime.world();
                    let mut state = ctx.state();
                    self.run_slice(ctx, &mut state, floor)?
                }
                Action::Block(op) => {
                    let resumed = self.block(ctx, op);
                    let _world = self.runtime.world();
                    let mut state = ctx.state();
                    state.release_pending();
                    if state.frames.len() <= floor {
                        // A blocking builtin invoked directly by the host.
                        match resumed {
                            Resumed::Fault(fault) => {
                                Action::Done(Outcome::Threw(self.materialize(&mut state, fault)?))
                            }
                            Resumed::Fatal(error) => return Err(error),
                            _ => Action::Done(Outcome::Returned(None)),
                        }
                    } else {
                        self.resume(&mut state, floor, resumed)?
                    }
                }
            };
        }
    }

    fn run_slice(
        &self,
        ctx: &Arc<ThreadContext>,
        state: &mut ThreadState,
        floor: usize,
    ) -> Result<Action> {
        for _ in 0..SLICE {
            let unwind = match self.step(ctx, state) {
                Ok(Step::Next) => {
                    state.frame_mut()?.pc += 1;
                    continue;
                }
                Ok(Step::Jump(offset)) => {
                    self.jump(state, offset)?;
                    continue;
                }
                Ok(Step::Stay) => continue,
                Ok(Step::Return(value)) => {
                    if let Some(outcome) = self.finish_frame(state, floor, value)? {
                        return Ok(Action::Done(outcome));
                    }
                    continue;
                }
                Ok(Step::Block(op)) => return Ok(Action::Block(op)),
                Err(unwind) => unwind,
            };
            let exc = self.throwable(state, unwind)?;
            if let Some(outcome) = self.unwind(state, floor, exc)? {
                return Ok(Action::Done(outcome));
            }
        }
        Ok(Action::Continue)
    }

    fn throwable(&self, state: &mut ThreadState, unwind: Unwind) -> Result<ObjRef> {
        match unwind {
            Unwind::Thrown(obj) => Ok(obj),
            Unwind::Fault(fault) => self.materialize(state, fault),
            Unwind::Fatal(error) => Err(error),
        }
    }

    fn materialize(&self, state: &mut ThreadState, fault: Fault) -> Result<ObjRef> {
        if fault == Fault::StackOverflow {
            self.runtime.count_overflow();
            debug!(depth = state.depth(), "stack overflow raised");
        }
        let obj = self.new_throwable(fault.class_name(), fault.message().as_deref())?;
        state.pending_exception = Some(obj);
        Ok(obj)
    }

    fn new_throwable(&self, class: &str, message: Option<&str>) -> Result<ObjRef> {
        let info = self
            .program
            .class(class)
            .ok_or_else(|| RuntimeError::UnknownClass(class.to_string()))?;
        let index = self.detail_message_index()?;
        let mut heap = self.runtime.heap();
        let obj = heap.allocate(&info.descriptor);
        if let Some(message) = message {
            let text = heap.alloc_string(message);
            heap.set_field(obj, index, Value::object(text))?;
        }
        Ok(obj)
    }

    fn jump(&self, state: &mut ThreadState, offset: u32) -> Result<()> {
        let frame = state.frame_mut()?;
        let method = self.method(frame.method)?;
        frame.pc = method.prologue.len() + method.body.partition_point(|s| s.offset < offset);
        Ok(())
    }

    /// Looks for a handler in each frame from the innermost out, releasing what unwound frames hold.
    fn unwind(&self, state: &mut ThreadState, floor: usize, exc: ObjRef) -> Result<Option<Outcome>> {
        state.pending_exception = Some(exc);
        let class = self.runtime.heap().class_of(exc)?.to_string();
        loop {
            let (index, pc) = {
                let frame = state.frame()?;
                (frame.method, frame.pc)
            };
            let method = self.method(index)?;
            let offset = pc
                .checked_sub(method.prologue.len())
                .and_then(|i| method.body.get(i))
                .map(|s| s.offset);
            let handler = offset.and_then(|offset| {
                method.handlers.iter().find(|h| {
                    h.covers(offset)
                        && h
                            .catch_type
                            .as_deref()
                            .map_or(true, |c| self.program.is_subclass(&class, c))
                })
            });
            if let Some(handler) = handler {
                let frame = state.frame_mut()?;
                frame.sp = frame.stack_base;
                state.push(Value::object(exc))?;
                self.jump(state, handler.handler)?;
                state.pending_exception = None;
                return Ok(None);
            }

            let frame = self.pop_frame(state)?;
            if let Some(init) = &frame.init {
                warn!(class = %init, exception = %class, "static initializer failed");
            }
            if state.frames.len() <= floor {
                state.pending_exception = None;
                return Ok(Some(Outcome::Threw(exc)));
            }
        }
    }

    fn pop_frame(&self, state: &mut ThreadState) -> Result<Frame> {
        let frame = state.frames.pop().ok_or(RuntimeError::NoFrame)?;
        state.leave_method();
        for obj in frame.entered.iter().rev().chain(frame.monitor.iter()) {
            if self.runtime.monitors.exit(*obj).is_err() {
                warn!(monitor = %obj, "monitor not held at frame exit");
            }
        }
        if let Some(class) = &frame.init {
            self.runtime.finish_init(class);
        }
        Ok(frame)
    }

    fn finish_frame(
        &self,
        state: &mut ThreadState,
        floor: usize,
        value: Option<Value>,
    ) -> Result<Option<Outcome>> {
        let frame = self.pop_frame(state)?;
        if state.frames.len() <= floor {
            return Ok(Some(Outcome::Returned(value)));
        }
        if frame.init.is_some() {
            return Ok(None);
        }
        if let Some(value) = value {
            state.push(value)?;
        }
        state.frame_mut()?.pc += 1;
        Ok(None)
    }

    fn push_frame(
        &self,
        state: &mut ThreadState,
        index: usize,
        args: Vec<Value>,
        init: Option<String>,
    ) -> Flow<()> {
        let method = self.method(index)?;
        let base = state.top();
        let stack_base = base + method.max_locals as usize;
        if !state.enter_method() {
            debug!(depth = state.depth(), method = %method.qualified_name(), "call depth limit reached");
            return Err(Fault::StackOverflow.into());
        }
        if stack_base + method.max_stack as usize > state.window() {
            state.leave_method();
            return Err(Fault::StackOverflow.into());
        }
        let mut slot = base;
        for value in args {
            state.set_slot(slot, value)?;
            slot += value.kind().slot_width() as usize;
        }
        for index in slot..stack_base {
            state.set_slot(index, Value::default())?;
        }
        state.frames.push(Frame {
            method: index,
            pc: 0,
            base,
            stack_base,
            sp: stack_base,
            monitor: None,
            entered: Vec::new(),
            init,
        });
        Ok(())
    }

    fn call(
        &self,
        ctx: &Arc<ThreadContext>,
        state: &mut ThreadState,
        symbol: &str,
        args: Vec<Value>,
    ) -> Flow<Called> {
        if let Some(index) = self.program.method_index(symbol) {
            let method = self.method(index)?;
            if method.has_body() {
                self.push_frame(state, index, args, None)?;
                return Ok(Called::Frame);
            }
            if method.is_abstract {
                return Err(Fault::AbstractMethod(method.qualified_name()).into());
            }
            return self.call_native(state, symbol, &args).map(Called::Value);
        }
        if let Some(builtin) = self.program.builtin(symbol) {
            return self.builtin(ctx, state, builtin, args);
        }
        self.call_native(state, symbol, &args).map(Called::Value)
    }

    fn call_native(&self, state: &mut ThreadState, symbol: &str, args: &[Value]) -> Flow<Option<Value>> {
        let native = lock(&self.natives)
            .get(symbol)
            .cloned()
            .ok_or_else(|| match self.program.method_index(symbol) {
                Some(_) => RuntimeError::MissingNative(symbol.to_string()),
                None => RuntimeError::UnresolvedSymbol(symbol.to_string()),
            })?;
        let result = {
            let mut call = NativeCall {
                runtime: &self.runtime,
                state: &mut *state,
                symbol,
                args,
            };
            native(&mut call)
        };
        state.release_pending();
        result
    }

    fn step(&self, ctx: &Arc<ThreadContext>, state: &mut ThreadState) -> Flow<Step> {
        let (index, pc) = {
            let frame = state.frame()?;
            (frame.method, frame.pc)
        };
        let method = self.method(index)?;
        let label = method.symbol.as_str();
        let prologue = method.prologue.len();
        let stmt = if pc < prologue {
            &method.prologue[pc]
        } else {
            &method
                .body
                .get(pc - prologue)
                .ok_or_else(|| RuntimeError::FellOffEnd(method.qualified_name()))?
                .stmt
        };

        match stmt {
            Stmt::ClassInit(class) => return self.class_init(state, class),
            Stmt::MethodMonitorEnter => {
                let obj = if method.is_static {
                    self.runtime.class_object(&method.class)
                } else {
                    state.local(0)?.as_ref()?.ok_or(Fault::NullPointer)?
                };
                if !self.runtime.monitors.try_enter(obj)? {
                    return Ok(Step::Block(BlockOp::Monitor { obj, method: true }));
                }
                state.frame_mut()?.monitor = Some(obj);
            }
            Stmt::MethodMonitorExit => {
                if let Some(obj) = state.frame_mut()?.monitor.take() {
                    self.runtime.monitors.exit(obj)?;
                }
            }
            Stmt::Push(constant) => {
                let value = match constant {
                    ConstantValue::String(text) => Value::object(self.runtime.intern(text)),
                    ConstantValue::Class(name) => Value::object(self.runtime.class_object(name)),
                    other => Value::from_constant(other).unwrap_or_default(),
                };
                state.push(value)?;
            }
            Stmt::PushNull => state.push(NULL)?,
            Stmt::Load { slot, .. } => {
                let value = state.local(*slot)?;
                state.push(value)?;
            }
            Stmt::Store { slot, .. } => {
                let value = state.pop(label)?;
                state.set_local(*slot, value)?;
            }
            Stmt::Pop(count) => {
                for _ in 0..*count {
                    state.pop(label)?;
                }
            }
            Stmt::Dup { count, depth } => dup(state, *count as usize, *depth as usize, label)?,
            Stmt::Swap => {
                let a = state.pop(label)?;
                let b = state.pop(label)?;
                state.push(a)?;
                state.push(b)?;
            }
            Stmt::Binary { kind, op } => {
                let b = state.pop(label)?;
                let a = state.pop(label)?;
                state.push(arith(*kind, *op, a, b)?)?;
            }
            Stmt::Neg(_) => {
                let value = match state.pop(label)? {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Long(v) => Value::Long(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(mismatch(ValueKind::Int, other).into()),
                };
                state.push(value)?;
            }
            Stmt::Convert { to, .. } => {
                let value = state.pop(label)?;
                state.push(convert(value, *to)?)?;
            }
            Stmt::Narrow(kind) => {
                let v = state.pop(label)?.as_int()?;
                state.push(Value::Int(match kind {
                    NarrowKind::Byte => i32::from(v as i8),
                    NarrowKind::Char => i32::from(v as u16),
                    NarrowKind::Short => i32::from(v as i16),
                }))?;
            }
            Stmt::Compare(op) => {
                let b = state.pop(label)?;
                let a = state.pop(label)?;
                state.push(Value::Int(compare(*op, a, b)?))?;
            }
            Stmt::IncLocal { slot, delta } => {
                let v = state.local(*slot)?.as_int()?;
                state.set_local(*slot, Value::Int(v.wrapping_add(*delta)))?;
            }
            Stmt::Goto(target) => return Ok(Step::Jump(*target)),
            Stmt::Branch {
                cond,
                operands,
                target,
            } => {
                let taken = match operands {
                    BranchOperands::IntZero => cond.holds(state.pop(label)?.as_int()?.cmp(&0)),
                    BranchOperands::IntPair => {
                        let b = state.pop(label)?.as_int()?;
                        let a = state.pop(label)?.as_int()?;
                        cond.holds(a.cmp(&b))
                    }
                    BranchOperands::RefPair => {
                        let b = state.pop(label)?.as_ref()?;
                        let a = state.pop(label)?.as_ref()?;
                        reference_test(*cond, a == b)
                    }
                    BranchOperands::Null => {
                        reference_test(*cond, state.pop(label)?.as_ref()?.is_none())
                    }
                };
                if taken {
                    return Ok(Step::Jump(*target));
                }
            }
            Stmt::Switch { cases, default } => {
                let key = state.pop(label)?.as_int()?;
                let target = cases
                    .iter()
                    .find(|(case, _)| *case == key)
                    .map_or(*default, |(_, target)| *target);
                return Ok(Step::Jump(target));
            }
            Stmt::GetField(target) => {
                let obj = non_null(state.pop(label)?)?;
                let index = self.field_index(&target.owner, &target.name)?;
                let value = self.runtime.heap().field(obj, index)?;
                state.push(value)?;
            }
            Stmt::PutField(target) => {
                let value = narrow_to(&target.ty, state.pop(label)?);
                let obj = non_null(state.pop(label)?)?;
                let index = self.field_index(&target.owner, &target.name)?;
                self.runtime.heap().set_field(obj, index, value)?;
            }
            Stmt::GetStatic(target) => {
                let symbol = target.symbol.as_deref().unwrap_or(&target.name);
                let value = self
                    .runtime
                    .static_value(symbol)
                    .ok_or_else(|| RuntimeError::UnresolvedSymbol(symbol.to_string()))?;
                state.push(value)?;
            }
            Stmt::PutStatic(target) => {
                let symbol = target.symbol.as_deref().unwrap_or(&target.name);
                let value = narrow_to(&target.ty, state.pop(label)?);
                self.runtime.set_static(symbol, value);
            }
            Stmt::ArrayLoad(_) => {
                let index = state.pop(label)?.as_int()?;
                let array = non_null(state.pop(label)?)?;
                let value = self.runtime.heap().array(array)?.load(index)?;
                state.push(value)?;
            }
            Stmt::ArrayStore(_) => {
                let value = state.pop(label)?;
                let index = state.pop(label)?.as_int()?;
                let array = non_null(state.pop(label)?)?;
                self.runtime.heap().array_mut(array)?.store(index, value)?;
            }
            Stmt::ArrayLength => {
                let array = non_null(state.pop(label)?)?;
                let length = self.runtime.heap().array(array)?.length;
                state.push(Value::Int(length as i32))?;
            }
            Stmt::New(class) => {
                let info = self
                    .program
                    .class(class)
                    .ok_or_else(|| RuntimeError::UnknownClass(class.clone()))?;
                let obj = self.runtime.heap().allocate(&info.descriptor);
                state.push(Value::object(obj))?;
            }
            Stmt::NewArray(element) => {
                let length = state.pop(label)?.as_int()?;
                let obj = self.runtime.heap().alloc_array(element, length)?;
                state.push(Value::object(obj))?;
            }
            Stmt::NewMultiArray { ty, dims } => {
                let mut lengths = Vec::with_capacity(*dims as usize);
                for _ in 0..*dims {
                    lengths.push(state.pop(label)?.as_int()?);
                }
                lengths.reverse();
                let obj = match lengths.as_slice() {
                    [outer, inner] => self.runtime.heap().alloc_2d(ty, *outer, *inner)?,
                    _ => self.runtime.heap().alloc_multi(ty, &lengths)?,
                };
                state.push(Value::object(obj))?;
            }
            Stmt::Invoke(call) => return self.invoke_stmt(ctx, state, call),
            Stmt::MonitorEnter => {
                let obj = non_null(state.peek(0)?)?;
                if !self.runtime.monitors.try_enter(obj)? {
                    return Ok(Step::Block(BlockOp::Monitor { obj, method: false }));
                }
                state.pop(label)?;
                state.frame_mut()?.entered.push(obj);
            }
            Stmt::MonitorExit => {
                let obj = non_null(state.pop(label)?)?;
                self.runtime.monitors.exit(obj)?;
                let entered = &mut state.frame_mut()?.entered;
                if let Some(at) = entered.iter().rposition(|o| *o == obj) {
                    entered.remove(at);
                }
            }
            Stmt::Throw => {
                let obj = non_null(state.pop(label)?)?;
                return Err(Unwind::Thrown(obj));
            }
            Stmt::Return(kind) => {
                let value = match kind {
                    Some(_) => Some(state.pop(label)?),
                    None => None,
                };
                return Ok(Step::Return(value));
            }
            Stmt::CheckCast(ty) => {
                if let Some(obj) = state.peek(0)?.as_ref()? {
                    let actual = self.runtime.heap().get(obj)?.java_type();
                    if !self.program.is_assignable(&actual, ty) {
                        return Err(Fault::ClassCast {
                            from: type_name(&actual),
                            to: type_name(ty),
                        }
                        .into());
                    }
                }
            }
            Stmt::InstanceOf(ty) => {
                let result = match state.pop(label)?.as_ref()? {
                    Some(obj) => {
                        let actual = self.runtime.heap().get(obj)?.java_type();
                        self.program.is_assignable(&actual, ty)
                    }
                    None => false,
                };
                state.push(Value::Int(i32::from(result)))?;
            }
        }
        Ok(Step::Next)
    }

    /// Runs pending static initializers of `class` and its superclasses, outermost first.
    fn class_init(&self, state: &mut ThreadState, class: &str) -> Flow<Step> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(name) = current {
            let Some(info) = self.program.class(name) else {
                break;
            };
            if let Some(clinit) = &info.clinit {
                chain.push((name, clinit.as_str()));
            }
            current = info.super_name.as_deref();
        }
        for (name, clinit) in chain.into_iter().rev() {
            match self.runtime.begin_init(name) {
                InitProgress::Ready => continue,
                InitProgress::Busy => return Ok(Step::Block(BlockOp::InitBusy)),
                InitProgress::Start => {
                    let index = self
                        .program
                        .method_index(clinit)
                        .ok_or_else(|| RuntimeError::UnresolvedSymbol(clinit.to_string()))?;
                    if let Err(unwind) = self.push_frame(state, index, Vec::new(), Some(name.to_string())) {
                        self.runtime.finish_init(name);
                        return Err(unwind);
                    }
                    return Ok(Step::Stay);
                }
            }
        }
        Ok(Step::Next)
    }

    fn invoke_stmt(&self, ctx: &Arc<ThreadContext>, state: &mut ThreadState, call: &Call) -> Flow<Step> {
        let count = call.arg_count();
        let (sp, stack_base) = {
            let frame = state.frame()?;
            (frame.sp, frame.stack_base)
        };
        if sp < stack_base + count {
            return Err(RuntimeError::StackUnderflow(call.key.name.clone()).into());
        }
        let start = sp - count;
        let args = (start..sp)
            .map(|i| state.slot(i))
            .collect::<Result<Vec<_>>>()?;
        state.frame_mut()?.sp = start;

        let symbol = match &call.dispatch {
            Dispatch::Direct { symbol } => {
                if call.has_receiver {
                    receiver(&args)?;
                }
                symbol.clone()
            }
            Dispatch::Virtual { slot } => {
                let class = self.runtime.heap().class_of(receiver(&args)?)?.to_string();
                self.program
                    .dispatch
                    .get(&class)
                    .and_then(|d| d.entry(*slot))
                    .and_then(|e| e.symbol.clone())
                    .ok_or_else(|| abstract_call(&class, &call.key))?
            }
            Dispatch::Interface => {
                let class = self.runtime.heap().class_of(receiver(&args)?)?.to_string();
                self.program
                    .dispatch
                    .lookup(&class, &call.key)
                    .map(str::to_string)
                    .ok_or_else(|| abstract_call(&class, &call.key))?
            }
        };

        match self.call(ctx, state, &symbol, args)? {
            Called::Frame => Ok(Step::Stay),
            Called::Value(value) => {
                if let Some(value) = value {
                    state.push(value)?;
                }
                Ok(Step::Next)
            }
            Called::Block(op) => Ok(Step::Block(op)),
        }
    }

    fn builtin(
        &self,
        ctx: &Arc<ThreadContext>,
        state: &mut ThreadState,
        builtin: Builtin,
        args: Vec<Value>,
    ) -> Flow<Called> {
        let arg = |i: usize| {
            args.get(i)
                .copied()
                .ok_or_else(|| RuntimeError::StackUnderflow(format!("{:?}", builtin)))
        };
        let value = match builtin {
            Builtin::ObjectInit | Builtin::ThreadInit | Builtin::ThrowableInit => None,
            Builtin::Equals => {
                let same = arg(0)?.as_ref()? == arg(1)?.as_ref()?;
                Some(Value::Int(i32::from(same)))
            }
            Builtin::HashCode => Some(Value::Int(receiver(&args)?.0 as i32)),
            Builtin::ToString => {
                let obj = receiver(&args)?;
                let mut heap = self.runtime.heap();
                let text = format!("{}@{:x}", heap.class_of(obj)?.replace('/', "."), obj.0);
                Some(Value::object(heap.alloc_string(&text)))
            }
            Builtin::Wait | Builtin::WaitTimed => {
                let obj = receiver(&args)?;
                let timeout = match builtin {
                    Builtin::WaitTimed => timed_wait(arg(1)?.as_long()?)?,
                    _ => None,
                };
                if self.runtime.monitors.hold_count(obj) == 0 {
                    return Err(Fault::IllegalMonitorState.into());
                }
                state.track_pending(obj)?;
                return Ok(Called::Block(BlockOp::Wait { obj, timeout }));
            }
            Builtin::Notify | Builtin::NotifyAll => {
                let obj = receiver(&args)?;
                self.runtime
                    .monitors
                    .notify(obj, builtin == Builtin::NotifyAll)?;
                None
            }
            Builtin::StringLength => {
                let obj = receiver(&args)?;
                let length = self.runtime.heap().string(obj)?.encode_utf16().count();
                Some(Value::Int(length as i32))
            }
            Builtin::RunnableRun => {
                return Err(Fault::AbstractMethod(format!("{}.run()V", rc::RUNNABLE)).into())
            }
            Builtin::ThreadInitTarget => {
                let obj = receiver(&args)?;
                let index = self.field_index(rc::THREAD, "target")?;
                self.runtime.heap().set_field(obj, index, arg(1)?)?;
                None
            }
            Builtin::ThreadRun => {
                let obj = receiver(&args)?;
                let index = self.field_index(rc::THREAD, "target")?;
                let target = self.runtime.heap().field(obj, index)?.as_ref()?;
                let Some(target) = target else {
                    return Ok(Called::Value(None));
                };
                let class = self.runtime.heap().class_of(target)?.to_string();
                let key = MethodKey::new("run", "()V");
                let symbol = self
                    .program
                    .dispatch
                    .lookup(&class, &key)
                    .map(str::to_string)
                    .ok_or_else(|| abstract_call(&class, &key))?;
                return self.call(ctx, state, &symbol, vec![Value::object(target)]);
            }
            Builtin::ThreadStart => {
                self.start_thread(receiver(&args)?)?;
                None
            }
            Builtin::ThreadJoin => {
                let obj = receiver(&args)?;
                state.track_pending(obj)?;
                return Ok(Called::Block(BlockOp::Join(obj)));
            }
            Builtin::ThreadInterrupt => {
                if let Some(thread) = self.runtime.thread_for(receiver(&args)?) {
                    thread.interrupt();
                }
                None
            }
            Builtin::ThreadIsInterrupted => {
                let interrupted = self
                    .runtime
                    .thread_for(receiver(&args)?)
                    .map_or(false, |t| t.is_interrupted());
                Some(Value::Int(i32::from(interrupted)))
            }
            Builtin::ThreadSleep => {
                let ms = arg(0)?.as_long()?;
                if ms < 0 {
                    return Err(Fault::IllegalArgument("timeout value is negative".to_string()).into());
                }
                return Ok(Called::Block(BlockOp::Sleep(Duration::from_millis(ms as u64))));
            }
            Builtin::ThreadInterrupted => Some(Value::Int(i32::from(ctx.take_interrupt()))),
            Builtin::CurrentThread => Some(Value::object(self.current_thread_object(ctx)?)),
            Builtin::SystemGc => return Ok(Called::Block(BlockOp::Gc)),
            Builtin::GetMessage => {
                let obj = receiver(&args)?;
                let index = self.detail_message_index()?;
                Some(self.runtime.heap().field(obj, index)?)
            }
            Builtin::ThrowableInitMessage => {
                let obj = receiver(&args)?;
                let index = self.detail_message_index()?;
                self.runtime.heap().set_field(obj, index, arg(1)?)?;
                None
            }
        };
        Ok(Called::Value(value))
    }

    fn current_thread_object(&self, ctx: &Arc<ThreadContext>) -> Result<ObjRef> {
        if let Some(obj) = ctx.thread_object() {
            return Ok(obj);
        }
        let info = self
            .program
            .class(rc::THREAD)
            .ok_or_else(|| RuntimeError::UnknownClass(rc::THREAD.to_string()))?;
        let obj = self.runtime.heap().allocate(&info.descriptor);
        self.runtime.bind_thread_object(obj, Arc::clone(ctx));
        Ok(obj)
    }

    fn start_thread(&self, obj: ObjRef) -> Result<()> {
        let class = self.runtime.heap().class_of(obj)?.to_string();
        let key = MethodKey::new("run", "()V");
        let symbol = self
            .program
            .dispatch
            .lookup(&class, &key)
            .map(str::to_string)
            .ok_or_else(|| RuntimeError::AbstractMethod(format!("{}.run()V", class)))?;
        let ctx = Arc::new(self.runtime.new_context(&format!("classport-thread-{}", obj.0)));
        self.runtime.bind_thread_object(obj, Arc::clone(&ctx));
        let executor = self.clone();
        let name = ctx.name.clone();
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || executor.run_thread(ctx, &symbol, obj))
            .map_err(|e| RuntimeError::ThreadSpawn(e.to_string()))?;
        info!(thread = %name, class = %class, "thread started");
        Ok(())
    }

    fn run_thread(&self, ctx: Arc<ThreadContext>, symbol: &str, obj: ObjRef) {
        self.runtime.attach(Arc::clone(&ctx));
        match self.run_on(&ctx, symbol, vec![Value::object(obj)]) {
            Ok(Outcome::Threw(exc)) => {
                warn!(thread = %ctx.name, exception = %self.describe(exc), "uncaught exception in thread")
            }
            Ok(Outcome::Returned(_)) => {}
            Err(e) => error!(thread = %ctx.name, error = %e, "thread aborted"),
        }
        self.runtime.detach();
    }

    /// Performs a blocking operation with no runtime lock held.
    fn block(&self, ctx: &Arc<ThreadContext>, op: BlockOp) -> Resumed {
        match op {
            BlockOp::Monitor { obj, method } => match self.runtime.monitors.enter(obj) {
                Ok(()) => Resumed::Entered { obj, method },
                Err(error) => Resumed::Fatal(error),
            },
            BlockOp::Wait { obj, timeout } => self
                .runtime
                .monitors
                .wait(obj, timeout, ctx.interrupt_flag())
                .into(),
            BlockOp::Sleep(duration) => threads::sleep(duration, ctx.interrupt_flag()).into(),
            BlockOp::Join(obj) => match self.runtime.thread_for(obj) {
                Some(thread) => thread.join(ctx.interrupt_flag()).into(),
                None => Resumed::Advance,
            },
            BlockOp::Gc => {
                debug!(thread = ctx.id, "collection requested");
                self.runtime.collect();
                Resumed::Advance
            }
            BlockOp::InitBusy => {
                std::thread::sleep(Duration::from_millis(1));
                Resumed::Retry
            }
        }
    }

    fn resume(&self, state: &mut ThreadState, floor: usize, resumed: Resumed) -> Result<Action> {
        match resumed {
            Resumed::Advance => state.frame_mut()?.pc += 1,
            Resumed::Entered { obj, method } => {
                if method {
                    state.frame_mut()?.monitor = Some(obj);
                } else {
                    let frame = state.frame_mut()?;
                    frame.sp -= 1;
                    frame.entered.push(obj);
                }
                state.frame_mut()?.pc += 1;
            }
            Resumed::Retry => {}
            Resumed::Fault(fault) => {
                let exc = self.materialize(state, fault)?;
                if let Some(outcome) = self.unwind(state, floor, exc)? {
                    return Ok(Action::Done(outcome));
                }
            }
            Resumed::Fatal(error) => return Err(error),
        }
        Ok(Action::Continue)
    }
}

fn mismatch(expected: ValueKind, found: Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

fn non_null(value: Value) -> Flow<ObjRef> {
    Ok(value.as_ref()?.ok_or(Fault::NullPointer)?)
}

fn receiver(args: &[Value]) -> Flow<ObjRef> {
    non_null(args.first().copied().unwrap_or(NULL))
}

fn abstract_call(class: &str, key: &MethodKey) -> Fault {
    Fault::AbstractMethod(format!("{}.{}{}", class, key.name, key.descriptor))
}

/// `wait(0)` waits without a deadline; a negative timeout is rejected.
fn timed_wait(ms: i64) -> Flow<Option<Duration>> {
    match ms {
        0 => Ok(None),
        ms if ms < 0 => Err(Fault::IllegalArgument("timeout value is negative".to_string()).into()),
        ms => Ok(Some(Duration::from_millis(ms as u64))),
    }
}

fn type_name(ty: &JavaType) -> String {
    match ty {
        JavaType::Object(name) => name.clone(),
        other => other.to_string(),
    }
}

fn reference_test(cond: Condition, holds: bool) -> bool {
    match cond {
        Condition::Ne => !holds,
        _ => holds,
    }
}

/// Copies the top `count` entries and inserts the copy below the `depth` entries under them.
fn dup(state: &mut ThreadState, count: usize, depth: usize, label: &str) -> Result<()> {
    let (sp, stack_base) = {
        let frame = state.frame()?;
        (frame.sp, frame.stack_base)
    };
    if sp < stack_base + count + depth {
        return Err(RuntimeError::StackUnderflow(label.to_string()));
    }
    let window = state.window();
    if sp + count > window {
        return Err(RuntimeError::StackWindowExhausted(window));
    }
    let slots = state.slots_mut();
    for i in 0..count {
        slots[sp + i] = slots[sp - count + i];
    }
    slots[sp - count - depth..sp + count].rotate_right(count);
    state.frame_mut()?.sp += count;
    Ok(())
}

/// Java's truncating stores into narrow fields.
fn narrow_to(ty: &JavaType, value: Value) -> Value {
    match (ty, value) {
        (JavaType::Boolean, Value::Int(v)) => Value::Int(v & 1),
        (JavaType::Byte, Value::Int(v)) => Value::Int(i32::from(v as i8)),
        (JavaType::Char, Value::Int(v)) => Value::Int(i32::from(v as u16)),
        (JavaType::Short, Value::Int(v)) => Value::Int(i32::from(v as i16)),
        _ => value,
    }
}

fn arith(kind: ValueKind, op: ArithOp, a: Value, b: Value) -> Flow<Value> {
    let value = match kind {
        ValueKind::Int => {
            let (x, y) = (a.as_int()?, b.as_int()?);
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y == 0 {
                return Err(Fault::DivideByZero.into());
            }
            Value::Int(match op {
                ArithOp::Add => x.wrapping_add(y),
                ArithOp::Sub => x.wrapping_sub(y),
                ArithOp::Mul => x.wrapping_mul(y),
                ArithOp::Div => x.wrapping_div(y),
                ArithOp::Rem => x.wrapping_rem(y),
                ArithOp::Shl => x.wrapping_shl(y as u32),
                ArithOp::Shr => x.wrapping_shr(y as u32),
                ArithOp::Ushr => (x as u32).wrapping_shr(y as u32) as i32,
                ArithOp::And => x & y,
                ArithOp::Or => x | y,
                ArithOp::Xor => x ^ y,
            })
        }
        ValueKind::Long if op.is_shift() => {
            let (x, s) = (a.as_long()?, b.as_int()? as u32);
            Value::Long(match op {
                ArithOp::Shl => x.wrapping_shl(s),
                ArithOp::Shr => x.wrapping_shr(s),
                _ => (x as u64).wrapping_shr(s) as i64,
            })
        }
        ValueKind::Long => {
            let (x, y) = (a.as_long()?, b.as_long()?);
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y == 0 {
                return Err(Fault::DivideByZero.into());
            }
            Value::Long(match op {
                ArithOp::Add => x.wrapping_add(y),
                ArithOp::Sub => x.wrapping_sub(y),
                ArithOp::Mul => x.wrapping_mul(y),
                ArithOp::Div => x.wrapping_div(y),
                ArithOp::Rem => x.wrapping_rem(y),
                ArithOp::And => x & y,
                ArithOp::Or => x | y,
                ArithOp::Xor => x ^ y,
                ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr => x,
            })
        }
        ValueKind::Float => {
            let (x, y) = (a.as_float()?, b.as_float()?);
            Value::Float(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
                _ => return Err(mismatch(ValueKind::Int, a).into()),
            })
        }
        ValueKind::Double => {
            let (x, y) = (a.as_double()?, b.as_double()?);
            Value::Double(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
                _ => return Err(mismatch(ValueKind::Long, a).into()),
            })
        }
        ValueKind::Ref => return Err(mismatch(ValueKind::Int, a).into()),
    };
    Ok(value)
}

fn convert(value: Value, to: ValueKind) -> Result<Value> {
    let converted = match (value, to) {
        (Value::Int(v), ValueKind::Long) => Value::Long(i64::from(v)),
        (Value::Int(v), ValueKind::Float) => Value::Float(v as f32),
        (Value::Int(v), ValueKind::Double) => Value::Double(f64::from(v)),
        (Value::Long(v), ValueKind::Int) => Value::Int(v as i32),
        (Value::Long(v), ValueKind::Float) => Value::Float(v as f32),
        (Value::Long(v), ValueKind::Double) => Value::Double(v as f64),
        (Value::Float(v), ValueKind::Int) => Value::Int(v as i32),
        (Value::Float(v), ValueKind::Long) => Value::Long(v as i64),
        (Value::Float(v), ValueKind::Double) => Value::Double(f64::from(v)),
        (Value::Double(v), ValueKind::Int) => Value::Int(v as i32),
        (Value::Double(v), ValueKind::Long) => Value::Long(v as i64),
        (Value::Double(v), ValueKind::Float) => Value::Float(v as f32),
        (value, to) if value.kind() == to => value,
        (value, to) => return Err(mismatch(to, value)),
    };
    Ok(converted)
}

fn compare(op: CompareOp, a: Value, b: Value) -> Result<i32> {
    let ordering = match op.kind {
        ValueKind::Long => Some(a.as_long()?.cmp(&b.as_long()?)),
        ValueKind::Float => a.as_float()?.partial_cmp(&b.as_float()?),
        ValueKind::Double => a.as_double()?.partial_cmp(&b.as_double()?),
        other => Some(a.as_int().map_err(|_| mismatch(other, a))?.cmp(&b.as_int()?)),
    };
    Ok(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => op.nan_result,
    })
}
