//! Host implementations of methods declared `native` in the input.

use crate::runtime::Runtime;
use crate::state::ThreadState;
use crate::unwind::{Fault, Flow};
use crate::value::{ObjRef, Value};
use crate::{Result, RuntimeError};
use std::sync::Arc;

pub type NativeFn = Arc<dyn Fn(&mut NativeCall<'_>) -> Flow<Option<Value>> + Send + Sync>;

/// Arguments and runtime access handed to a native implementation.
pub struct NativeCall<'a> {
    pub runtime: &'a Runtime,
    pub state: &'a mut ThreadState,
    pub symbol: &'a str,
    pub args: &'a [Value],
}

impl<'a> NativeCall<'a> {
    fn arg(&self, index: usize) -> Result<Value> {
        self.args
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeError::StackUnderflow(self.symbol.to_string()))
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        self.arg(index)?.as_int()
    }

    pub fn long(&self, index: usize) -> Result<i64> {
        self.arg(index)?.as_long()
    }

    pub fn object(&self, index: usize) -> Flow<ObjRef> {
        Ok(self.arg(index)?.as_ref()?.ok_or(Fault::NullPointer)?)
    }

    pub fn string(&self, index: usize) -> Flow<String> {
        let obj = self.object(index)?;
        Ok(self.runtime.heap().string(obj)?.to_string())
    }

    /// Allocates a string kept alive until the native returns.
    pub fn new_string(&mut self, text: &str) -> Result<ObjRef> {
        let obj = self.runtime.heap().alloc_string(text);
        self.state.track_pending(obj)?;
        Ok(obj)
    }
}
