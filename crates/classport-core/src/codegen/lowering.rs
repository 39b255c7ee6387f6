/*! Instruction lowering.
 *
 * Turns the verified instruction list of every live method into [`Stmt`]s. Lowering is a single
 * forward pass: each reachable instruction is rewritten using the stack shape the verifier
 * computed for it, and every reference it makes is resolved against the culled class table. A
 * reference to something the culler eliminated is a hard error, never a silent stub.
 */

use super::context::{LoweringContext, MethodTarget};
use super::dispatch::DispatchTables;
use super::stmt::{
    Call, Dispatch, FieldTarget, LoweredClass, LoweredHandler, LoweredMethod, LoweredStmt,
    StaticField, Stmt,
};
use super::mangle;
use super::runtime_contract::functions;
use crate::analysis::{stack_shape, verify_method, CullReport, StackShape};
use crate::class::ClassRecord;
use crate::class_table::ClassTable;
use crate::config::NativeSource;
use crate::instructions::{FieldOp, Insn, Instruction, InvokeKind, MemberRef};
use crate::method::{MethodAccessFlags, MethodKey, MethodRecord};
use crate::types::{JavaType, MethodDescriptor};
use crate::values::ConstantValue;
use crate::{Result, TranslateError};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Everything the emitters need, with no further reference to the class table.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub classes: Vec<LoweredClass>,
    pub dispatch: DispatchTables,
    /// String constants in first-use order; `Stmt::Push(String)` values index into this.
    pub strings: Vec<String>,
    pub entry_class: String,
    pub entry_symbol: String,
    pub native_sources: Vec<NativeSource>,
}

impl LoweredProgram {
    pub fn class(&self, name: &str) -> Option<&LoweredClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &LoweredMethod> {
        self.classes.iter().flat_map(|c| c.methods.iter())
    }

    pub fn method_by_symbol(&self, symbol: &str) -> Option<&LoweredMethod> {
        self.methods().find(|m| m.symbol == symbol)
    }

    pub fn string_index(&self, value: &str) -> Option<usize> {
        self.strings.iter().position(|s| s == value)
    }

    /// Every symbol some lowered method refers to.
    pub fn referenced_symbols(&self) -> BTreeSet<&str> {
        self.methods()
            .flat_map(|m| m.referenced_symbols.iter().map(String::as_str))
            .collect()
    }

    /// Every symbol the lowered classes define.
    pub fn defined_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        for class in &self.classes {
            symbols.insert(class.symbol.clone());
            for field in &class.static_fields {
                symbols.insert(field.symbol.clone());
            }
            for method in class.methods.iter().filter(|m| !m.is_abstract) {
                symbols.insert(method.symbol.clone());
            }
        }
        symbols
    }
}

/// Lowers every live class of a culled table.
pub fn lower_program(
    table: &ClassTable,
    report: &CullReport,
    entry: (&str, &str, &str),
) -> Result<LoweredProgram> {
    let (entry_class, entry_method, entry_descriptor) = entry;
    let class = table
        .get(entry_class)
        .ok_or_else(|| TranslateError::ClassNotFound(entry_class.to_string()))?;
    let method = class
        .find_method(entry_method, entry_descriptor)
        .map(|(_, m)| m)
        .filter(|m| !m.eliminated)
        .ok_or_else(|| TranslateError::EntryPointNotFound {
            class: entry_class.to_string(),
            method: format!("{}{}", entry_method, entry_descriptor),
        })?;
    let entry_symbol = mangle::method_symbol(&class.name, &method.name, &method.signature);

    let dispatch = DispatchTables::build(table);
    let mut ctx = LoweringContext::new(table, &dispatch, &report.effectively_final);
    let mut classes = Vec::new();
    for class in table.live_classes() {
        classes.push(lower_class(&mut ctx, class)?);
    }
    let strings = ctx.strings.into_iter().collect::<Vec<_>>();
    let statements: usize = classes
        .iter()
        .flat_map(|c| c.methods.iter())
        .map(|m| m.body.len())
        .sum();
    info!(
        classes = classes.len(),
        statements,
        strings = strings.len(),
        "lowering complete"
    );

    Ok(LoweredProgram {
        classes,
        dispatch,
        strings,
        entry_class: entry_class.to_string(),
        entry_symbol,
        native_sources: Vec::new(),
    })
}

fn lower_class(ctx: &mut LoweringContext<'_>, class: &ClassRecord) -> Result<LoweredClass> {
    let instance_fields = class
        .instance_fields()
        .filter(|f| !f.eliminated)
        .map(|f| (f.name.clone(), f.ty.clone()))
        .collect();
    let static_fields = class
        .static_fields()
        .filter(|f| !f.eliminated)
        .map(|f| StaticField {
            name: f.name.clone(),
            ty: f.ty.clone(),
            symbol: mangle::static_field_symbol(&class.name, &f.name),
            constant: f.constant.clone(),
        })
        .collect();
    let mut methods = Vec::new();
    for method in class.live_methods() {
        methods.push(lower_method(ctx, class, method)?);
    }
    let clinit_symbol = class
        .static_initializer()
        .filter(|(_, m)| !m.eliminated)
        .map(|(_, m)| mangle::method_symbol(&class.name, &m.name, &m.signature));

    Ok(LoweredClass {
        name: class.name.clone(),
        symbol: mangle::class_symbol(&class.name),
        super_name: class.super_name.clone(),
        interfaces: class.interfaces.clone(),
        is_interface: class.is_interface(),
        is_abstract: class.is_abstract(),
        instance_fields,
        static_fields,
        methods,
        clinit_symbol,
    })
}

/// Lowers one method. The method is verified first; unreachable instructions produce nothing.
pub fn lower_method(
    ctx: &mut LoweringContext<'_>,
    class: &ClassRecord,
    method: &MethodRecord,
) -> Result<LoweredMethod> {
    ctx.current = method.qualified_name();
    let mut lowered = LoweredMethod {
        class: class.name.clone(),
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        symbol: mangle::method_symbol(&class.name, &method.name, &method.signature),
        is_static: method.is_static(),
        is_synchronized: method.is_synchronized(),
        is_native: method.is_native(),
        is_abstract: method.is_abstract(),
        params: method.signature.param_kinds(),
        ret: method.signature.return_kind(),
        max_stack: method.max_stack,
        max_locals: method.max_locals.max(method.arg_slots()),
        prologue: Vec::new(),
        body: Vec::new(),
        handlers: Vec::new(),
        jump_targets: BTreeSet::new(),
        referenced_symbols: BTreeSet::new(),
    };
    if !method.has_body() {
        return Ok(lowered);
    }

    let frames = verify_method(method)?;
    if method.is_static()
        && !method.is_static_initializer()
        && class.has_static_initializer()
    {
        lowered.prologue.push(Stmt::ClassInit(class.name.clone()));
        lowered.referenced_symbols.insert(functions::CLASS_INIT.to_string());
    }
    if method.is_synchronized() {
        lowered.prologue.push(Stmt::MethodMonitorEnter);
        lowered
            .referenced_symbols
            .insert(functions::MONITOR_ENTER.to_string());
    }

    for (index, insn) in method.instructions.iter().enumerate() {
        let Some(stack) = frames.before(index) else {
            continue;
        };
        let stmts = lower_instruction(ctx, method, insn, stack, &mut lowered.referenced_symbols)?;
        for stmt in stmts {
            if let Stmt::Return(_) = stmt {
                if method.is_synchronized() {
                    lowered.body.push(LoweredStmt {
                        offset: insn.offset,
                        stmt: Stmt::MethodMonitorExit,
                    });
                }
            }
            lowered.body.push(LoweredStmt {
                offset: insn.offset,
                stmt,
            });
        }
        lowered.jump_targets.extend(insn.op.branch_targets());
    }

    for handler in &method.handlers {
        let reachable = method
            .instruction_index(handler.handler)
            .map(|i| frames.is_reachable(i))
            .unwrap_or(false);
        if !reachable {
            continue;
        }
        if let Some(catch) = &handler.catch_type {
            ctx.check_class(catch)?;
            lowered.referenced_symbols.insert(mangle::class_symbol(catch));
        }
        lowered.jump_targets.insert(handler.handler);
        lowered.handlers.push(LoweredHandler {
            start: handler.start,
            end: handler.end,
            handler: handler.handler,
            catch_type: handler.catch_type.clone(),
        });
    }

    debug!(
        method = %ctx.current,
        instructions = method.instructions.len(),
        statements = lowered.body.len(),
        "lowered method"
    );
    Ok(lowered)
}

fn unsupported(method: &MethodRecord, insn: &Insn) -> TranslateError {
    TranslateError::UnsupportedInstruction {
        method: method.qualified_name(),
        offset: insn.offset,
        instruction: format!("{:?}", insn.op),
    }
}

fn lower_instruction(
    ctx: &mut LoweringContext<'_>,
    method: &MethodRecord,
    insn: &Insn,
    stack: &[crate::values::ValueKind],
    symbols: &mut BTreeSet<String>,
) -> Result<Vec<Stmt>> {
    let stmt = match &insn.op {
        Instruction::Nop => return Ok(Vec::new()),
        Instruction::Const(value) => {
            match value {
                ConstantValue::String(text) => {
                    ctx.intern(text);
                    symbols.insert(functions::STRING_CONSTANT.to_string());
                }
                ConstantValue::Class(name) => {
                    if let Ok(JavaType::Object(class)) = JavaType::from_class_constant(name) {
                        ctx.check_class(&class)?;
                        symbols.insert(mangle::class_symbol(&class));
                    }
                    symbols.insert(functions::CLASS_LITERAL.to_string());
                }
                _ => {}
            }
            Stmt::Push(value.clone())
        }
        Instruction::ConstNull => Stmt::PushNull,
        Instruction::Load { kind, slot } => Stmt::Load {
            slot: *slot,
            kind: *kind,
        },
        Instruction::Store { kind, slot } => Stmt::Store {
            slot: *slot,
            kind: *kind,
        },
        Instruction::Stack(op) => match stack_shape(*op, stack) {
            Some(StackShape::Pop(count)) => Stmt::Pop(count),
            Some(StackShape::Dup { count, depth }) => Stmt::Dup { count, depth },
            Some(StackShape::Swap) => Stmt::Swap,
            None => return Err(unsupported(method, insn)),
        },
        Instruction::Arith { kind, op } => Stmt::Binary {
            kind: *kind,
            op: *op,
        },
        Instruction::Neg(kind) => Stmt::Neg(*kind),
        Instruction::Convert { from, to } => Stmt::Convert {
            from: *from,
            to: *to,
        },
        Instruction::Narrow(kind) => Stmt::Narrow(*kind),
        Instruction::Compare(op) => Stmt::Compare(*op),
        Instruction::Iinc { slot, delta } => Stmt::IncLocal {
            slot: *slot,
            delta: i32::from(*delta),
        },
        Instruction::Goto { target } => Stmt::Goto(*target),
        Instruction::If {
            cond,
            operands,
            target,
        } => Stmt::Branch {
            cond: *cond,
            operands: *operands,
            target: *target,
        },
        Instruction::TableSwitch {
            default,
            low,
            targets,
            ..
        } => Stmt::Switch {
            cases: targets
                .iter()
                .enumerate()
                .map(|(i, target)| (low.wrapping_add(i as i32), *target))
                .collect(),
            default: *default,
        },
        Instruction::LookupSwitch { default, pairs } => Stmt::Switch {
            cases: pairs.clone(),
            default: *default,
        },
        Instruction::Field { op, field } => return lower_field(ctx, method, *op, field, symbols),
        Instruction::ArrayLoad(elem) => Stmt::ArrayLoad(*elem),
        Instruction::ArrayStore(elem) => Stmt::ArrayStore(*elem),
        Instruction::ArrayLength => Stmt::ArrayLength,
        Instruction::Invoke { kind, method: target } => {
            return lower_invoke(ctx, method, *kind, target, symbols)
        }
        Instruction::InvokeDynamic { .. } => return Err(unsupported(method, insn)),
        Instruction::New(class) => {
            ctx.check_class(class)?;
            symbols.insert(mangle::class_symbol(class));
            symbols.insert(functions::ALLOC_OBJECT.to_string());
            let mut stmts = Vec::new();
            if class != &method.class_name && ctx.class_has_initializer(class) {
                stmts.push(Stmt::ClassInit(class.clone()));
            }
            stmts.push(Stmt::New(class.clone()));
            return Ok(stmts);
        }
        Instruction::NewArray(element) => {
            check_type(ctx, element, symbols)?;
            symbols.insert(functions::ALLOC_ARRAY.to_string());
            Stmt::NewArray(element.clone())
        }
        Instruction::MultiNewArray { ty, dims } => {
            check_type(ctx, ty, symbols)?;
            symbols.insert(if *dims == 2 {
                functions::ALLOC_2D_ARRAY.to_string()
            } else {
                functions::ALLOC_MULTI_ARRAY.to_string()
            });
            Stmt::NewMultiArray {
                ty: ty.clone(),
                dims: *dims,
            }
        }
        Instruction::CheckCast(name) => {
            let ty = JavaType::from_class_constant(name)?;
            check_type(ctx, &ty, symbols)?;
            symbols.insert(functions::CHECK_CAST.to_string());
            Stmt::CheckCast(ty)
        }
        Instruction::InstanceOf(name) => {
            let ty = JavaType::from_class_constant(name)?;
            check_type(ctx, &ty, symbols)?;
            symbols.insert(functions::INSTANCE_OF.to_string());
            Stmt::InstanceOf(ty)
        }
        Instruction::Throw => {
            symbols.insert(functions::THROW.to_string());
            Stmt::Throw
        }
        Instruction::MonitorEnter => {
            symbols.insert(functions::MONITOR_ENTER.to_string());
            Stmt::MonitorEnter
        }
        Instruction::MonitorExit => {
            symbols.insert(functions::MONITOR_EXIT.to_string());
            Stmt::MonitorExit
        }
        Instruction::Return(kind) => Stmt::Return(*kind),
    };
    Ok(vec![stmt])
}

fn check_type(
    ctx: &LoweringContext<'_>,
    ty: &JavaType,
    symbols: &mut BTreeSet<String>,
) -> Result<()> {
    if let Some(class) = ty.referenced_class() {
        ctx.check_class(class)?;
        symbols.insert(mangle::class_symbol(class));
    }
    Ok(())
}

fn lower_field(
    ctx: &mut LoweringContext<'_>,
    method: &MethodRecord,
    op: FieldOp,
    field: &MemberRef,
    symbols: &mut BTreeSet<String>,
) -> Result<Vec<Stmt>> {
    let (owner, record) = ctx.resolve_field(field)?;
    let ty = match record {
        Some(record) => record.ty.clone(),
        None => JavaType::parse(&field.descriptor)?,
    };
    symbols.insert(mangle::class_symbol(&owner));
    let symbol = op.is_static().then(|| mangle::static_field_symbol(&owner, &field.name));
    if let Some(symbol) = &symbol {
        symbols.insert(symbol.clone());
    }
    let target = FieldTarget {
        owner: owner.clone(),
        name: field.name.clone(),
        ty,
        symbol,
    };

    let mut stmts = Vec::new();
    if op.is_static() && owner != method.class_name && ctx.class_has_initializer(&owner) {
        symbols.insert(functions::CLASS_INIT.to_string());
        stmts.push(Stmt::ClassInit(owner));
    }
    stmts.push(match op {
        FieldOp::GetField => Stmt::GetField(target),
        FieldOp::PutField => Stmt::PutField(target),
        FieldOp::GetStatic => Stmt::GetStatic(target),
        FieldOp::PutStatic => Stmt::PutStatic(target),
    });
    Ok(stmts)
}

fn lower_invoke(
    ctx: &mut LoweringContext<'_>,
    method: &MethodRecord,
    kind: InvokeKind,
    member: &MemberRef,
    symbols: &mut BTreeSet<String>,
) -> Result<Vec<Stmt>> {
    let descriptor = MethodDescriptor::parse(&member.descriptor)?;
    let key = MethodKey::from(member);
    let target = ctx.resolve_method(member)?;

    let dispatch = match kind {
        InvokeKind::Static | InvokeKind::Special => Dispatch::Direct {
            symbol: ctx.direct_symbol(member, &target)?,
        },
        InvokeKind::Virtual => {
            let devirtualize = match &target {
                MethodTarget::Table(record) => {
                    record.flags.contains(MethodAccessFlags::FINAL)
                        || record.is_private()
                        || (ctx.effectively_final.contains(&member.owner)
                            && !record.is_abstract())
                }
                MethodTarget::Runtime(runtime) => !runtime.is_virtual,
                MethodTarget::Missing => true,
            };
            let slot = ctx.dispatch.slot_of(&member.owner, &key);
            match slot {
                Some(slot) if !devirtualize => {
                    symbols.insert(functions::VTABLE_LOOKUP.to_string());
                    Dispatch::Virtual { slot }
                }
                _ => Dispatch::Direct {
                    symbol: ctx.direct_symbol(member, &target)?,
                },
            }
        }
        InvokeKind::Interface => {
            symbols.insert(functions::ITABLE_LOOKUP.to_string());
            Dispatch::Interface
        }
    };
    if let Dispatch::Direct { symbol } = &dispatch {
        symbols.insert(symbol.clone());
    }

    let mut stmts = Vec::new();
    if kind == InvokeKind::Static
        && member.owner != method.class_name
        && ctx.class_has_initializer(&member.owner)
    {
        symbols.insert(functions::CLASS_INIT.to_string());
        stmts.push(Stmt::ClassInit(member.owner.clone()));
    }
    stmts.push(Stmt::Invoke(Call {
        dispatch,
        owner: member.owner.clone(),
        key,
        params: descriptor.param_kinds(),
        ret: descriptor.return_kind(),
        has_receiver: kind != InvokeKind::Static,
    }));
    Ok(stmts)
}
