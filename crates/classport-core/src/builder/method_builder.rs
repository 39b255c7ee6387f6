use crate::{
    instructions::{
        ArithOp, ArrayElem, BranchOperands, CompareOp, Condition, FieldOp, Insn, Instruction,
        InvokeKind, MemberRef, StackOp,
    },
    method::{ExceptionHandler, MethodAccessFlags, MethodRecord},
    types::{JavaType, MethodDescriptor},
    values::{ConstantValue, ValueKind},
    Result, TranslateError,
};
use std::collections::HashMap;

const DEFAULT_MAX_STACK: u16 = 64;

/// Builds one method body. Instruction `i` sits at offset `i`; jump targets are label names
/// resolved in `build`.
pub struct MethodBuilder<'a> {
    class_name: String,
    name: String,
    descriptor: String,
    flags: MethodAccessFlags,
    code: Vec<(Instruction, Vec<String>)>,
    labels: HashMap<String, u32>,
    handlers: Vec<(String, String, String, Option<String>)>,
    max_stack: Option<u16>,
    max_locals: Option<u16>,
    methods: &'a mut Vec<MethodRecord>,
}

impl<'a> MethodBuilder<'a> {
    pub fn new(
        class_name: &str,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
        methods: &'a mut Vec<MethodRecord>,
    ) -> Self {
        Self {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            code: Vec::new(),
            labels: HashMap::new(),
            handlers: Vec::new(),
            max_stack: None,
            max_locals: None,
            methods,
        }
    }

    pub fn flags(&mut self, flags: MethodAccessFlags) -> &mut Self {
        self.flags |= flags;
        self
    }

    pub fn synchronized(&mut self) -> &mut Self {
        self.flags(MethodAccessFlags::SYNCHRONIZED)
    }

    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = Some(max_stack);
        self
    }

    pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
        self.max_locals = Some(max_locals);
        self
    }

    pub fn op(&mut self, op: Instruction) -> &mut Self {
        self.code.push((op, Vec::new()));
        self
    }

    fn jump(&mut self, op: Instruction, labels: Vec<String>) -> &mut Self {
        self.code.push((op, labels));
        self
    }

    pub fn label(&mut self, name: &str) -> &mut Self {
        self.labels.insert(name.to_string(), self.code.len() as u32);
        self
    }

    /// Handler covering `[start, end)`; `catch_type == None` catches everything.
    pub fn handler(
        &mut self,
        start: &str,
        end: &str,
        handler: &str,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers.push((
            start.to_string(),
            end.to_string(),
            handler.to_string(),
            catch_type.map(str::to_string),
        ));
        self
    }

    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.op(Instruction::Const(ConstantValue::Int(value)))
    }

    pub fn lconst(&mut self, value: i64) -> &mut Self {
        self.op(Instruction::Const(ConstantValue::Long(value)))
    }

    pub fn fconst(&mut self, value: f32) -> &mut Self {
        self.op(Instruction::Const(ConstantValue::Float(value)))
    }

    pub fn dconst(&mut self, value: f64) -> &mut Self {
        self.op(Instruction::Const(ConstantValue::Double(value)))
    }

    pub fn sconst(&mut self, value: &str) -> &mut Self {
        self.op(Instruction::Const(ConstantValue::String(value.to_string())))
    }

    pub fn aconst_null(&mut self) -> &mut Self {
        self.op(Instruction::ConstNull)
    }

    pub fn load(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        self.op(Instruction::Load { kind, slot })
    }

    pub fn store(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        self.op(Instruction::Store { kind, slot })
    }

    pub fn iload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueKind::Int, slot)
    }

    pub fn lload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueKind::Long, slot)
    }

    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueKind::Ref, slot)
    }

    pub fn istore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueKind::Int, slot)
    }

    pub fn lstore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueKind::Long, slot)
    }

    pub fn astore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueKind::Ref, slot)
    }

    pub fn stack(&mut self, op: StackOp) -> &mut Self {
        self.op(Instruction::Stack(op))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.stack(StackOp::Pop)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.stack(StackOp::Dup)
    }

    pub fn arith(&mut self, kind: ValueKind, op: ArithOp) -> &mut Self {
        self.op(Instruction::Arith { kind, op })
    }

    pub fn iadd(&mut self) -> &mut Self {
        self.arith(ValueKind::Int, ArithOp::Add)
    }

    pub fn isub(&mut self) -> &mut Self {
        self.arith(ValueKind::Int, ArithOp::Sub)
    }

    pub fn imul(&mut self) -> &mut Self {
        self.arith(ValueKind::Int, ArithOp::Mul)
    }

    pub fn idiv(&mut self) -> &mut Self {
        self.arith(ValueKind::Int, ArithOp::Div)
    }

    pub fn compare(&mut self, kind: ValueKind, nan_result: i32) -> &mut Self {
        self.op(Instruction::Compare(CompareOp { kind, nan_result }))
    }

    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        self.op(Instruction::Iinc { slot, delta })
    }

    pub fn goto(&mut self, label: &str) -> &mut Self {
        self.jump(Instruction::Goto { target: 0 }, vec![label.to_string()])
    }

    pub fn branch(&mut self, cond: Condition, operands: BranchOperands, label: &str) -> &mut Self {
        self.jump(
            Instruction::If {
                cond,
                operands,
                target: 0,
            },
            vec![label.to_string()],
        )
    }

    pub fn if_zero(&mut self, cond: Condition, label: &str) -> &mut Self {
        self.branch(cond, BranchOperands::IntZero, label)
    }

    pub fn if_icmp(&mut self, cond: Condition, label: &str) -> &mut Self {
        self.branch(cond, BranchOperands::IntPair, label)
    }

    pub fn if_null(&mut self, label: &str) -> &mut Self {
        self.branch(Condition::Eq, BranchOperands::Null, label)
    }

    pub fn if_nonnull(&mut self, label: &str) -> &mut Self {
        self.branch(Condition::Ne, BranchOperands::Null, label)
    }

    pub fn tableswitch(&mut self, low: i32, labels: &[&str], default: &str) -> &mut Self {
        let high = low + labels.len() as i32 - 1;
        let mut names: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        names.push(default.to_string());
        self.jump(
            Instruction::TableSwitch {
                default: 0,
                low,
                high,
                targets: vec![0; labels.len()],
            },
            names,
        )
    }

    pub fn lookupswitch(&mut self, cases: &[(i32, &str)], default: &str) -> &mut Self {
        let mut names: Vec<String> = cases.iter().map(|(_, l)| l.to_string()).collect();
        names.push(default.to_string());
        self.jump(
            Instruction::LookupSwitch {
                default: 0,
                pairs: cases.iter().map(|(k, _)| (*k, 0)).collect(),
            },
            names,
        )
    }

    pub fn field(&mut self, op: FieldOp, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Instruction::Field {
            op,
            field: MemberRef::new(owner, name, descriptor),
        })
    }

    pub fn getfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldOp::GetField, owner, name, descriptor)
    }

    pub fn putfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldOp::PutField, owner, name, descriptor)
    }

    pub fn getstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldOp::GetStatic, owner, name, descriptor)
    }

    pub fn putstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(FieldOp::PutStatic, owner, name, descriptor)
    }

    pub fn array_load(&mut self, elem: ArrayElem) -> &mut Self {
        self.op(Instruction::ArrayLoad(elem))
    }

    pub fn array_store(&mut self, elem: ArrayElem) -> &mut Self {
        self.op(Instruction::ArrayStore(elem))
    }

    pub fn arraylength(&mut self) -> &mut Self {
        self.op(Instruction::ArrayLength)
    }

    pub fn invoke(&mut self, kind: InvokeKind, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Instruction::Invoke {
            kind,
            method: MemberRef::new(owner, name, descriptor),
        })
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Static, owner, name, descriptor)
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Virtual, owner, name, descriptor)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Special, owner, name, descriptor)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(InvokeKind::Interface, owner, name, descriptor)
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.op(Instruction::New(class.to_string()))
    }

    /// `new C; dup; invokespecial C.<init>()V`.
    pub fn construct(&mut self, class: &str) -> &mut Self {
        self.new_object(class)
            .dup()
            .invoke_special(class, "<init>", "()V")
    }

    pub fn newarray(&mut self, element: JavaType) -> &mut Self {
        self.op(Instruction::NewArray(element))
    }

    pub fn multianewarray(&mut self, ty: JavaType, dims: u8) -> &mut Self {
        self.op(Instruction::MultiNewArray { ty, dims })
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        self.op(Instruction::CheckCast(class.to_string()))
    }

    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        self.op(Instruction::InstanceOf(class.to_string()))
    }

    pub fn athrow(&mut self) -> &mut Self {
        self.op(Instruction::Throw)
    }

    pub fn monitorenter(&mut self) -> &mut Self {
        self.op(Instruction::MonitorEnter)
    }

    pub fn monitorexit(&mut self) -> &mut Self {
        self.op(Instruction::MonitorExit)
    }

    pub fn ret(&mut self, kind: Option<ValueKind>) -> &mut Self {
        self.op(Instruction::Return(kind))
    }

    pub fn ireturn(&mut self) -> &mut Self {
        self.ret(Some(ValueKind::Int))
    }

    pub fn lreturn(&mut self) -> &mut Self {
        self.ret(Some(ValueKind::Long))
    }

    pub fn areturn(&mut self) -> &mut Self {
        self.ret(Some(ValueKind::Ref))
    }

    pub fn return_void(&mut self) -> &mut Self {
        self.ret(None)
    }

    fn resolve(&self, label: &str) -> Result<u32> {
        self.labels.get(label).copied().ok_or_else(|| {
            TranslateError::BuilderError(format!(
                "{}.{}: undefined label {}",
                self.class_name, self.name, label
            ))
        })
    }

    fn patch(&self, op: Instruction, labels: &[String]) -> Result<Instruction> {
        if labels.is_empty() {
            return Ok(op);
        }
        let targets = labels
            .iter()
            .map(|l| self.resolve(l))
            .collect::<Result<Vec<u32>>>()?;
        let (cases, default) = targets.split_at(targets.len() - 1);
        let default = default[0];
        Ok(match op {
            Instruction::Goto { .. } => Instruction::Goto { target: default },
            Instruction::If { cond, operands, .. } => Instruction::If {
                cond,
                operands,
                target: default,
            },
            Instruction::TableSwitch { low, high, .. } => Instruction::TableSwitch {
                default,
                low,
                high,
                targets: cases.to_vec(),
            },
            Instruction::LookupSwitch { pairs, .. } => Instruction::LookupSwitch {
                default,
                pairs: pairs
                    .iter()
                    .zip(cases)
                    .map(|((key, _), target)| (*key, *target))
                    .collect(),
            },
            other => other,
        })
    }

    pub fn build(self) -> Result<()> {
        let mut method = MethodRecord::new(&self.class_name, &self.name, &self.descriptor, self.flags)?;
        let mut instructions = Vec::with_capacity(self.code.len());
        for (offset, (op, labels)) in self.code.iter().enumerate() {
            instructions.push(Insn::new(offset as u32, self.patch(op.clone(), labels)?));
        }
        for (start, end, handler, catch_type) in &self.handlers {
            method.handlers.push(ExceptionHandler {
                start: self.resolve(start)?,
                end: self.resolve(end)?,
                handler: self.resolve(handler)?,
                catch_type: catch_type.clone(),
            });
        }
        let used_locals = instructions
            .iter()
            .filter_map(|insn| match &insn.op {
                Instruction::Load { kind, slot } | Instruction::Store { kind, slot } => {
                    Some(slot + kind.slot_width())
                }
                Instruction::Iinc { slot, .. } => Some(slot + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let descriptor = MethodDescriptor::parse(&self.descriptor)?;
        let arg_slots = descriptor.arg_slots() + u16::from(!self.flags.contains(MethodAccessFlags::STATIC));
        method.max_locals = self.max_locals.unwrap_or(used_locals.max(arg_slots));
        method.max_stack = if method.has_body() {
            self.max_stack.unwrap_or(DEFAULT_MAX_STACK)
        } else {
            0
        };
        method.instructions = instructions;
        method.compute_edges();
        self.methods.push(method);
        Ok(())
    }
}
