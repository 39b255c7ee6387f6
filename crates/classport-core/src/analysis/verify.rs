/*! Operand-stack verification.
 *
 * Abstract interpretation over value kinds: every reachable instruction gets the exact stack shape
 * it executes with, every join point must agree on that shape, and every jump lands on an
 * instruction boundary. Lowering relies on these shapes to size `dup2`/`pop2` and friends, so a
 * method is verified once, eagerly, before any of it is lowered.
 */

use crate::instructions::{Instruction, StackOp};
use crate::method::MethodRecord;
use crate::types::{JavaType, MethodDescriptor};
use crate::values::ValueKind;
use crate::{Result, TranslateError};

/// Resolved effect of a generic stack instruction, in stack entries (a long is one entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackShape {
    Pop(u8),
    /// Copy the top `count` entries and insert the copy below the next `depth` entries.
    Dup { count: u8, depth: u8 },
    Swap,
}

fn category(kind: ValueKind) -> u8 {
    if kind.is_wide() {
        2
    } else {
        1
    }
}

/// Picks the form of a stack instruction that matches the categories on top of `stack`.
pub fn stack_shape(op: StackOp, stack: &[ValueKind]) -> Option<StackShape> {
    let cat = |depth: usize| -> Option<u8> {
        stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| category(stack[i]))
    };
    let shape = match op {
        StackOp::Pop => match cat(0)? {
            1 => StackShape::Pop(1),
            _ => return None,
        },
        StackOp::Pop2 => match cat(0)? {
            2 => StackShape::Pop(1),
            _ if cat(1)? == 1 => StackShape::Pop(2),
            _ => return None,
        },
        StackOp::Dup => match cat(0)? {
            1 => StackShape::Dup { count: 1, depth: 0 },
            _ => return None,
        },
        StackOp::DupX1 => match (cat(0)?, cat(1)?) {
            (1, 1) => StackShape::Dup { count: 1, depth: 1 },
            _ => return None,
        },
        StackOp::DupX2 => match (cat(0)?, cat(1)?) {
            (1, 2) => StackShape::Dup { count: 1, depth: 1 },
            (1, 1) if cat(2)? == 1 => StackShape::Dup { count: 1, depth: 2 },
            _ => return None,
        },
        StackOp::Dup2 => match cat(0)? {
            2 => StackShape::Dup { count: 1, depth: 0 },
            _ if cat(1)? == 1 => StackShape::Dup { count: 2, depth: 0 },
            _ => return None,
        },
        StackOp::Dup2X1 => match (cat(0)?, cat(1)?) {
            (2, 1) => StackShape::Dup { count: 1, depth: 1 },
            (1, 1) if cat(2)? == 1 => StackShape::Dup { count: 2, depth: 1 },
            _ => return None,
        },
        StackOp::Dup2X2 => match (cat(0)?, cat(1)?) {
            (2, 2) => StackShape::Dup { count: 1, depth: 1 },
            (2, 1) if cat(2)? == 1 => StackShape::Dup { count: 1, depth: 2 },
            (1, 1) => match cat(2)? {
                2 => StackShape::Dup { count: 2, depth: 1 },
                _ if cat(3)? == 1 => StackShape::Dup { count: 2, depth: 2 },
                _ => return None,
            },
            _ => return None,
        },
        StackOp::Swap => match (cat(0)?, cat(1)?) {
            (1, 1) => StackShape::Swap,
            _ => return None,
        },
    };
    Some(shape)
}

/// Applies a resolved shape to a stack of any element type.
pub fn apply_shape<T: Clone>(shape: StackShape, stack: &mut Vec<T>) {
    match shape {
        StackShape::Pop(count) => {
            let len = stack.len().saturating_sub(count as usize);
            stack.truncate(len);
        }
        StackShape::Dup { count, depth } => {
            let len = stack.len();
            let copy = stack[len - count as usize..].to_vec();
            let at = len - count as usize - depth as usize;
            stack.splice(at..at, copy);
        }
        StackShape::Swap => {
            let len = stack.len();
            stack.swap(len - 1, len - 2);
        }
    }
}

/// Stack shape before each instruction, by instruction index. `None` marks unreachable code.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStates {
    states: Vec<Option<Vec<ValueKind>>>,
}

impl FrameStates {
    pub fn before(&self, index: usize) -> Option<&[ValueKind]> {
        self.states.get(index).and_then(|s| s.as_deref())
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.before(index).is_some()
    }

    pub fn max_depth(&self) -> u16 {
        self.states
            .iter()
            .flatten()
            .map(|s| stack_width(s))
            .max()
            .unwrap_or(0)
    }
}

fn stack_width(stack: &[ValueKind]) -> u16 {
    stack.iter().map(|k| k.slot_width()).sum()
}

fn pop(stack: &mut Vec<ValueKind>, expected: ValueKind) -> std::result::Result<(), String> {
    match stack.pop() {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(format!("expected {} on stack, found {}", expected, kind)),
        None => Err(format!("stack underflow, expected {}", expected)),
    }
}

fn push_type(stack: &mut Vec<ValueKind>, ty: &JavaType) {
    if let Some(kind) = ty.value_kind() {
        stack.push(kind);
    }
}

fn apply(
    method: &MethodRecord,
    op: &Instruction,
    stack: &mut Vec<ValueKind>,
) -> std::result::Result<(), String> {
    let check_local = |slot: u16, kind: ValueKind| {
        if slot + kind.slot_width() > method.max_locals {
            Err(format!(
                "local slot {} out of range (max_locals {})",
                slot, method.max_locals
            ))
        } else {
            Ok(())
        }
    };
    match op {
        Instruction::Nop | Instruction::Goto { .. } => {}
        Instruction::Const(value) => stack.push(value.kind()),
        Instruction::ConstNull | Instruction::New(_) => stack.push(ValueKind::Ref),
        Instruction::Load { kind, slot } => {
            check_local(*slot, *kind)?;
            stack.push(*kind);
        }
        Instruction::Store { kind, slot } => {
            check_local(*slot, *kind)?;
            pop(stack, *kind)?;
        }
        Instruction::Stack(op) => {
            let shape = stack_shape(*op, stack)
                .ok_or_else(|| format!("{:?} does not match stack {:?}", op, stack))?;
            apply_shape(shape, stack);
        }
        Instruction::Arith { kind, op } => {
            if op.is_shift() {
                pop(stack, ValueKind::Int)?;
            } else {
                pop(stack, *kind)?;
            }
            pop(stack, *kind)?;
            stack.push(*kind);
        }
        Instruction::Neg(kind) => {
            pop(stack, *kind)?;
            stack.push(*kind);
        }
        Instruction::Convert { from, to } => {
            pop(stack, *from)?;
            stack.push(*to);
        }
        Instruction::Narrow(_) => {
            pop(stack, ValueKind::Int)?;
            stack.push(ValueKind::Int);
        }
        Instruction::Compare(cmp) => {
            pop(stack, cmp.kind)?;
            pop(stack, cmp.kind)?;
            stack.push(ValueKind::Int);
        }
        Instruction::Iinc { slot, .. } => check_local(*slot, ValueKind::Int)?,
        Instruction::If { operands, .. } => {
            for kind in operands.popped() {
                pop(stack, *kind)?;
            }
        }
        Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
            pop(stack, ValueKind::Int)?;
        }
        Instruction::Field { op, field } => {
            let ty = JavaType::parse(&field.descriptor).map_err(|e| e.to_string())?;
            let kind = ty
                .value_kind()
                .ok_or_else(|| format!("field {} has void type", field))?;
            use crate::instructions::FieldOp::*;
            match op {
                GetField => {
                    pop(stack, ValueKind::Ref)?;
                    stack.push(kind);
                }
                PutField => {
                    pop(stack, kind)?;
                    pop(stack, ValueKind::Ref)?;
                }
                GetStatic => stack.push(kind),
                PutStatic => pop(stack, kind)?,
            }
        }
        Instruction::ArrayLoad(elem) => {
            pop(stack, ValueKind::Int)?;
            pop(stack, ValueKind::Ref)?;
            stack.push(elem.kind());
        }
        Instruction::ArrayStore(elem) => {
            pop(stack, elem.kind())?;
            pop(stack, ValueKind::Int)?;
            pop(stack, ValueKind::Ref)?;
        }
        Instruction::ArrayLength => {
            pop(stack, ValueKind::Ref)?;
            stack.push(ValueKind::Int);
        }
        Instruction::Invoke { kind, method: target } => {
            let desc = MethodDescriptor::parse(&target.descriptor).map_err(|e| e.to_string())?;
            for param in desc.param_kinds().iter().rev() {
                pop(stack, *param)?;
            }
            if *kind != crate::instructions::InvokeKind::Static {
                pop(stack, ValueKind::Ref)?;
            }
            push_type(stack, &desc.ret);
        }
        Instruction::InvokeDynamic { descriptor, .. } => {
            let desc = MethodDescriptor::parse(descriptor).map_err(|e| e.to_string())?;
            for param in desc.param_kinds().iter().rev() {
                pop(stack, *param)?;
            }
            push_type(stack, &desc.ret);
        }
        Instruction::NewArray(_) => {
            pop(stack, ValueKind::Int)?;
            stack.push(ValueKind::Ref);
        }
        Instruction::MultiNewArray { dims, .. } => {
            if *dims == 0 {
                return Err("multianewarray with zero dimensions".to_string());
            }
            for _ in 0..*dims {
                pop(stack, ValueKind::Int)?;
            }
            stack.push(ValueKind::Ref);
        }
        Instruction::CheckCast(_) => {
            pop(stack, ValueKind::Ref)?;
            stack.push(ValueKind::Ref);
        }
        Instruction::InstanceOf(_) => {
            pop(stack, ValueKind::Ref)?;
            stack.push(ValueKind::Int);
        }
        Instruction::Throw | Instruction::MonitorEnter | Instruction::MonitorExit => {
            pop(stack, ValueKind::Ref)?;
        }
        Instruction::Return(kind) => {
            let expected = method.signature.return_kind();
            if *kind != expected {
                return Err(format!(
                    "return of {:?} from method returning {:?}",
                    kind, expected
                ));
            }
            if let Some(kind) = kind {
                pop(stack, *kind)?;
            }
        }
    }
    Ok(())
}

pub fn verify_method(method: &MethodRecord) -> Result<FrameStates> {
    let code = &method.instructions;
    let fail = |offset: u32, message: String| TranslateError::Verification {
        class: method.class_name.clone(),
        method: format!("{}{}", method.name, method.descriptor),
        offset,
        message,
    };
    let mut states: Vec<Option<Vec<ValueKind>>> = vec![None; code.len()];
    if code.is_empty() {
        return Ok(FrameStates { states });
    }

    let mut handler_targets = Vec::with_capacity(method.handlers.len());
    for handler in &method.handlers {
        let index = method
            .instruction_index(handler.handler)
            .ok_or_else(|| fail(handler.handler, "handler offset is not an instruction".into()))?;
        if handler.end <= handler.start {
            return Err(fail(handler.start, "empty handler range".into()));
        }
        handler_targets.push(index);
    }

    let merge = |states: &mut Vec<Option<Vec<ValueKind>>>,
                     worklist: &mut Vec<usize>,
                     index: usize,
                     incoming: Vec<ValueKind>,
                     offset: u32|
     -> Result<()> {
        match &states[index] {
            None => {
                states[index] = Some(incoming);
                worklist.push(index);
                Ok(())
            }
            Some(existing) if *existing == incoming => Ok(()),
            Some(existing) => Err(fail(
                offset,
                format!(
                    "inconsistent stack at join to offset {}: {:?} vs {:?}",
                    code[index].offset, existing, incoming
                ),
            )),
        }
    };

    let mut worklist = Vec::new();
    merge(&mut states, &mut worklist, 0, Vec::new(), code[0].offset)?;

    while let Some(index) = worklist.pop() {
        let insn = &code[index];
        let mut stack = states[index].clone().unwrap_or_default();

        for (handler, target) in method.handlers.iter().zip(&handler_targets) {
            if handler.covers(insn.offset) {
                merge(&mut states, &mut worklist, *target, vec![ValueKind::Ref], insn.offset)?;
            }
        }

        apply(method, &insn.op, &mut stack).map_err(|message| fail(insn.offset, message))?;
        if stack_width(&stack) > method.max_stack {
            return Err(fail(
                insn.offset,
                format!(
                    "stack depth {} exceeds max_stack {}",
                    stack_width(&stack),
                    method.max_stack
                ),
            ));
        }

        for target in insn.op.branch_targets() {
            let next = method
                .instruction_index(target)
                .ok_or_else(|| fail(insn.offset, format!("invalid jump target {}", target)))?;
            merge(&mut states, &mut worklist, next, stack.clone(), insn.offset)?;
        }
        if !insn.op.ends_block() {
            if index + 1 >= code.len() {
                return Err(fail(insn.offset, "execution falls off the end of the code".into()));
            }
            merge(&mut states, &mut worklist, index + 1, stack, insn.offset)?;
        }
    }

    Ok(FrameStates { states })
}
