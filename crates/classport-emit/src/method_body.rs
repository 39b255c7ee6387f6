/*! C function bodies for lowered methods.
 *
 * A generated function claims `max_locals + max_stack` tagged slots from the thread's object-stack
 * window on entry, so every live reference sits where the collector can see it. Statements push
 * and pop through the macros of the runtime header; operands are always popped into named
 * temporaries before anything is pushed. Every fault jumps to `cp_unwind`, which matches the
 * current bytecode offset against the handler ranges in declaration order and either resumes at a
 * handler with the exception as the only stack entry or releases the frame and returns.
 */

use crate::c_syntax::{self, UNWIND_LABEL};
use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
use crate::tables::{type_operand, SharedTables};
use anyhow::{anyhow, bail, Result};
use classport_core::codegen::{Call, Dispatch, FieldTarget, LoweredMethod};
use classport_core::instructions::{
    ArithOp, ArrayElem, BranchOperands, CompareOp, NarrowKind,
};
use classport_core::{ConstantValue, JavaType, Stmt, ValueKind};
use std::collections::BTreeMap;
use std::io::Write;

fn suffix(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int => "I",
        ValueKind::Long => "L",
        ValueKind::Float => "F",
        ValueKind::Double => "D",
        ValueKind::Ref => "O",
    }
}

fn pop(kind: ValueKind, name: &str) -> String {
    format!("{} {} = CP_POP_{}();", kind.c_type(), name, suffix(kind))
}

fn push(kind: ValueKind, expr: &str) -> String {
    format!("CP_PUSH_{}({});", suffix(kind), expr)
}

/// Truncation applied when an int is stored into narrow storage.
fn store_value(ty: &JavaType, value: &str) -> String {
    match ty {
        JavaType::Boolean => format!("(JAVA_BOOLEAN) ({} & 1)", value),
        JavaType::Byte | JavaType::Char | JavaType::Short => {
            format!("({}) {}", ty.c_type(), value)
        }
        _ => value.to_string(),
    }
}

fn binary_expr(kind: ValueKind, op: ArithOp) -> Result<String> {
    let expr = match kind {
        ValueKind::Int | ValueKind::Long => {
            let prefix = if kind == ValueKind::Int { "cp_i" } else { "cp_l" };
            let name = match op {
                ArithOp::And | ArithOp::Or | ArithOp::Xor => {
                    return Ok(format!("a {} b", op.symbol()))
                }
                ArithOp::Add => "add",
                ArithOp::Sub => "sub",
                ArithOp::Mul => "mul",
                ArithOp::Div => "div",
                ArithOp::Rem => "rem",
                ArithOp::Shl => "shl",
                ArithOp::Shr => "shr",
                ArithOp::Ushr => "ushr",
            };
            format!("{}{}(a, b)", prefix, name)
        }
        ValueKind::Float | ValueKind::Double => match op {
            ArithOp::Rem if kind == ValueKind::Float => "fmodf(a, b)".to_string(),
            ArithOp::Rem => "fmod(a, b)".to_string(),
            ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Div => {
                format!("a {} b", op.symbol())
            }
            _ => bail!("no {} operation on {} operands", op.symbol(), kind),
        },
        ValueKind::Ref => bail!("no {} operation on references", op.symbol()),
    };
    Ok(expr)
}

fn convert_expr(from: ValueKind, to: ValueKind) -> Result<String> {
    let expr = match (from, to) {
        (ValueKind::Long, ValueKind::Int) => "cp_l2i(a)".to_string(),
        (ValueKind::Float | ValueKind::Double, ValueKind::Int) => "cp_d2i(a)".to_string(),
        (ValueKind::Float | ValueKind::Double, ValueKind::Long) => "cp_d2l(a)".to_string(),
        (ValueKind::Ref, _) | (_, ValueKind::Ref) => {
            bail!("no conversion from {} to {}", from, to)
        }
        (_, to) => format!("({}) a", to.c_type()),
    };
    Ok(expr)
}

fn narrow_type(kind: NarrowKind) -> &'static str {
    match kind {
        NarrowKind::Byte => "JAVA_BYTE",
        NarrowKind::Char => "JAVA_CHAR",
        NarrowKind::Short => "JAVA_SHORT",
    }
}

fn compare_expr(op: CompareOp) -> String {
    match op.kind {
        ValueKind::Long => "cp_lcmp(a, b)".to_string(),
        _ => format!("cp_fcmp(a, b, {})", op.nan_result),
    }
}

pub struct MethodEmitter<'a> {
    tables: &'a SharedTables,
    config: &'a EmitterConfig,
}

impl<'a> MethodEmitter<'a> {
    pub fn new(tables: &'a SharedTables, config: &'a EmitterConfig) -> Self {
        Self { tables, config }
    }

    fn type_ref(&self, ty: &JavaType) -> Result<String> {
        let index = self
            .tables
            .type_index(ty)
            .ok_or_else(|| anyhow!("type {} missing from the descriptor table", ty))?;
        Ok(format!("&classport_types[{}]", index))
    }

    fn null_check(&self, lines: &mut Vec<String>, var: &str) {
        if self.config.runtime.null_checks {
            lines.push(format!("CP_NULL_CHECK({});", var));
        }
    }

    fn bounds_check(&self, lines: &mut Vec<String>) {
        if self.config.runtime.bounds_checks {
            lines.push("CP_BOUNDS_CHECK(array, index);".to_string());
        }
    }

    fn monitor_target(&self, method: &LoweredMethod) -> Result<String> {
        if method.is_static {
            Ok(format!(
                "classport_class_literal(ts, {})",
                self.type_ref(&JavaType::object(&method.class))?
            ))
        } else {
            Ok("self".to_string())
        }
    }

    fn field_access(&self, target: &FieldTarget) -> String {
        format!(
            "(({}*) obj)->{}",
            c_syntax::instance_struct(&target.owner),
            c_syntax::field_member(&target.name)
        )
    }

    fn static_symbol<'t>(&self, target: &'t FieldTarget) -> Result<&'t str> {
        target
            .symbol
            .as_deref()
            .ok_or_else(|| anyhow!("static field {}.{} has no symbol", target.owner, target.name))
    }

    fn invoke(&self, call: &Call) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut args = Vec::new();
        if call.has_receiver {
            args.push((ValueKind::Ref, "a0".to_string()));
        }
        let base = args.len();
        for (i, kind) in call.params.iter().enumerate() {
            args.push((*kind, format!("a{}", base + i)));
        }
        for (kind, name) in args.iter().rev() {
            lines.push(pop(*kind, name));
        }
        if call.has_receiver {
            self.null_check(&mut lines, "a0");
        }

        let mut actuals = vec!["ts".to_string()];
        actuals.extend(args.iter().map(|(_, name)| name.clone()));
        let actuals = actuals.join(", ");
        let callee = match &call.dispatch {
            Dispatch::Direct { symbol } => symbol.clone(),
            Dispatch::Virtual { slot } => {
                lines.push(format!("void* fn = classport_vtable_lookup(ts, a0, {});", slot));
                lines.push("CP_CHECK();".to_string());
                format!(
                    "(({}) fn)",
                    c_syntax::function_pointer(call.has_receiver, &call.params, call.ret)
                )
            }
            Dispatch::Interface => {
                lines.push(format!(
                    "void* fn = classport_itable_lookup(ts, a0, {}, {});",
                    c_syntax::string_literal(&call.key.name),
                    c_syntax::string_literal(&call.key.descriptor)
                ));
                lines.push("CP_CHECK();".to_string());
                format!(
                    "(({}) fn)",
                    c_syntax::function_pointer(call.has_receiver, &call.params, call.ret)
                )
            }
        };
        match call.ret {
            Some(kind) => {
                lines.push(format!("{} r = {}({});", kind.c_type(), callee, actuals));
                lines.push("CP_CHECK();".to_string());
                lines.push(push(kind, "r"));
            }
            None => {
                lines.push(format!("{}({});", callee, actuals));
                lines.push("CP_CHECK();".to_string());
            }
        }
        Ok(lines)
    }

    /// C lines for one statement. More than one line means the caller wraps them in a block.
    pub fn statement(&self, method: &LoweredMethod, stmt: &Stmt) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        match stmt {
            Stmt::ClassInit(class) => {
                lines.push(format!(
                    "classport_class_init(ts, {});",
                    c_syntax::class_ref(class)
                ));
                lines.push("CP_CHECK();".to_string());
            }
            Stmt::MethodMonitorEnter => {
                lines.push(format!(
                    "classport_monitor_enter(ts, {});",
                    self.monitor_target(method)?
                ));
                lines.push("CP_CHECK();".to_string());
                lines.push("monitor_held = 1;".to_string());
            }
            Stmt::MethodMonitorExit => {
                lines.push("monitor_held = 0;".to_string());
                lines.push(format!(
                    "classport_monitor_exit(ts, {});",
                    self.monitor_target(method)?
                ));
                lines.push("CP_CHECK();".to_string());
            }
            Stmt::Push(value) => match value {
                ConstantValue::String(text) => {
                    let index = self
                        .tables
                        .string_index(text)
                        .ok_or_else(|| anyhow!("string constant {:?} was not interned", text))?;
                    lines.push(format!(
                        "JAVA_OBJECT s = classport_string_constant(ts, {});",
                        index
                    ));
                    lines.push("CP_CHECK();".to_string());
                    lines.push(push(ValueKind::Ref, "s"));
                }
                ConstantValue::Class(_) => {
                    let ty = type_operand(stmt).ok_or_else(|| anyhow!("bad class literal"))?;
                    lines.push(format!(
                        "JAVA_OBJECT c = classport_class_literal(ts, {});",
                        self.type_ref(&ty)?
                    ));
                    lines.push("CP_CHECK();".to_string());
                    lines.push(push(ValueKind::Ref, "c"));
                }
                numeric => {
                    let literal = c_syntax::numeric_literal(numeric)
                        .ok_or_else(|| anyhow!("constant {} has no literal", numeric))?;
                    lines.push(push(numeric.kind(), &literal));
                }
            },
            Stmt::PushNull => lines.push(push(ValueKind::Ref, "NULL")),
            Stmt::Load { slot, kind } => lines.push(push(
                *kind,
                &format!("locals[{}].v.{}", slot, kind.slot_member()),
            )),
            Stmt::Store { slot, kind } => lines.push(format!(
                "CP_SET_{}({}, CP_POP_{}());",
                suffix(*kind),
                slot,
                suffix(*kind)
            )),
            Stmt::Pop(count) => lines.push(format!("sp -= {};", count)),
            Stmt::Dup { count, depth } => {
                lines.push(format!("cp_dup(stack, &sp, {}, {});", count, depth))
            }
            Stmt::Swap => {
                lines.push("CP_SLOT top = stack[sp - 1];".to_string());
                lines.push("stack[sp - 1] = stack[sp - 2];".to_string());
                lines.push("stack[sp - 2] = top;".to_string());
            }
            Stmt::Binary { kind, op } => {
                let rhs = if op.is_shift() { ValueKind::Int } else { *kind };
                let expr = binary_expr(*kind, *op)?;
                lines.push(pop(rhs, "b"));
                lines.push(pop(*kind, "a"));
                if matches!(op, ArithOp::Div | ArithOp::Rem)
                    && matches!(kind, ValueKind::Int | ValueKind::Long)
                {
                    lines.push("CP_ZERO_CHECK(b);".to_string());
                }
                lines.push(push(*kind, &expr));
            }
            Stmt::Neg(kind) => {
                let expr = match kind {
                    ValueKind::Int => "cp_ineg(a)",
                    ValueKind::Long => "cp_lneg(a)",
                    ValueKind::Float | ValueKind::Double => "-a",
                    ValueKind::Ref => bail!("cannot negate a reference"),
                };
                lines.push(pop(*kind, "a"));
                lines.push(push(*kind, expr));
            }
            Stmt::Convert { from, to } => {
                let expr = convert_expr(*from, *to)?;
                lines.push(pop(*from, "a"));
                lines.push(push(*to, &expr));
            }
            Stmt::Narrow(kind) => {
                lines.push(pop(ValueKind::Int, "a"));
                lines.push(push(
                    ValueKind::Int,
                    &format!("(JAVA_INT) ({}) a", narrow_type(*kind)),
                ));
            }
            Stmt::Compare(op) => {
                lines.push(pop(op.kind, "b"));
                lines.push(pop(op.kind, "a"));
                lines.push(push(ValueKind::Int, &compare_expr(*op)));
            }
            Stmt::IncLocal { slot, delta } => lines.push(format!(
                "locals[{slot}].v.i = cp_iadd(locals[{slot}].v.i, {});",
                c_syntax::int_literal(*delta)
            )),
            Stmt::Goto(target) => lines.push(format!("goto {};", c_syntax::label(*target))),
            Stmt::Branch {
                cond,
                operands,
                target,
            } => {
                let label = c_syntax::label(*target);
                let op = cond.c_operator();
                match operands {
                    BranchOperands::IntZero => {
                        lines.push(pop(ValueKind::Int, "a"));
                        lines.push(format!("if (a {} 0) goto {};", op, label));
                    }
                    BranchOperands::IntPair | BranchOperands::RefPair => {
                        let kind = if *operands == BranchOperands::IntPair {
                            ValueKind::Int
                        } else {
                            ValueKind::Ref
                        };
                        lines.push(pop(kind, "b"));
                        lines.push(pop(kind, "a"));
                        lines.push(format!("if (a {} b) goto {};", op, label));
                    }
                    BranchOperands::Null => {
                        lines.push(pop(ValueKind::Ref, "a"));
                        lines.push(format!("if (a {} NULL) goto {};", op, label));
                    }
                }
            }
            Stmt::Switch { cases, default } => {
                let indent = &self.config.indent_style.to_string();
                lines.push(pop(ValueKind::Int, "key"));
                lines.push("switch (key) {".to_string());
                for (key, target) in cases {
                    lines.push(format!(
                        "{}case {}: goto {};",
                        indent,
                        c_syntax::int_literal(*key),
                        c_syntax::label(*target)
                    ));
                }
                lines.push(format!("{}default: goto {};", indent, c_syntax::label(*default)));
                lines.push("}".to_string());
            }
            Stmt::GetField(target) => {
                lines.push(pop(ValueKind::Ref, "obj"));
                self.null_check(&mut lines, "obj");
                lines.push(push(target.kind(), &self.field_access(target)));
            }
            Stmt::PutField(target) => {
                lines.push(pop(target.kind(), "value"));
                lines.push(pop(ValueKind::Ref, "obj"));
                self.null_check(&mut lines, "obj");
                lines.push(format!(
                    "{} = {};",
                    self.field_access(target),
                    store_value(&target.ty, "value")
                ));
            }
            Stmt::GetStatic(target) => {
                lines.push(push(target.kind(), self.static_symbol(target)?));
            }
            Stmt::PutStatic(target) => {
                lines.push(pop(target.kind(), "value"));
                lines.push(format!(
                    "{} = {};",
                    self.static_symbol(target)?,
                    store_value(&target.ty, "value")
                ));
            }
            Stmt::ArrayLoad(elem) => {
                lines.push(pop(ValueKind::Int, "index"));
                lines.push(pop(ValueKind::Ref, "array"));
                self.null_check(&mut lines, "array");
                self.bounds_check(&mut lines);
                lines.push(push(
                    elem.kind(),
                    &format!("CP_ELEMENTS({}, array)[index]", elem.c_type()),
                ));
            }
            Stmt::ArrayStore(elem) => {
                lines.push(pop(elem.kind(), "value"));
                lines.push(pop(ValueKind::Int, "index"));
                lines.push(pop(ValueKind::Ref, "array"));
                self.null_check(&mut lines, "array");
                self.bounds_check(&mut lines);
                let value = match elem {
                    ArrayElem::Byte | ArrayElem::Char | ArrayElem::Short => {
                        format!("({}) value", elem.c_type())
                    }
                    _ => "value".to_string(),
                };
                lines.push(format!(
                    "CP_ELEMENTS({}, array)[index] = {};",
                    elem.c_type(),
                    value
                ));
            }
            Stmt::ArrayLength => {
                lines.push(pop(ValueKind::Ref, "array"));
                self.null_check(&mut lines, "array");
                lines.push(push(ValueKind::Int, "CP_ARRAY_LENGTH(array)"));
            }
            Stmt::New(class) => {
                lines.push(format!(
                    "JAVA_OBJECT obj = classport_alloc_object(ts, {});",
                    c_syntax::class_ref(class)
                ));
                lines.push("CP_CHECK();".to_string());
                lines.push(push(ValueKind::Ref, "obj"));
            }
            Stmt::NewArray(_) => {
                let ty = type_operand(stmt).ok_or_else(|| anyhow!("bad array type"))?;
                lines.push(pop(ValueKind::Int, "length"));
                lines.push(format!(
                    "JAVA_OBJECT array = classport_alloc_array(ts, {}, length);",
                    self.type_ref(&ty)?
                ));
                lines.push("CP_CHECK();".to_string());
                lines.push(push(ValueKind::Ref, "array"));
            }
            Stmt::NewMultiArray { ty, dims } => {
                let type_ref = self.type_ref(ty)?;
                if *dims == 2 {
                    lines.push(pop(ValueKind::Int, "inner"));
                    lines.push(pop(ValueKind::Int, "outer"));
                    lines.push(format!(
                        "JAVA_OBJECT array = classport_alloc_2d_array(ts, {}, outer, inner);",
                        type_ref
                    ));
                } else {
                    lines.push(format!("JAVA_INT lengths[{}];", dims));
                    lines.push("JAVA_INT d;".to_string());
                    lines.push(format!(
                        "for (d = {}; d >= 0; d--) lengths[d] = CP_POP_I();",
                        i32::from(*dims) - 1
                    ));
                    lines.push(format!(
                        "JAVA_OBJECT array = classport_alloc_multi_array(ts, {}, {}, lengths);",
                        type_ref, dims
                    ));
                }
                lines.push("CP_CHECK();".to_string());
                lines.push(push(ValueKind::Ref, "array"));
            }
            Stmt::Invoke(call) => lines = self.invoke(call)?,
            Stmt::MonitorEnter | Stmt::MonitorExit => {
                let function = if *stmt == Stmt::MonitorEnter {
                    "classport_monitor_enter"
                } else {
                    "classport_monitor_exit"
                };
                lines.push(pop(ValueKind::Ref, "obj"));
                self.null_check(&mut lines, "obj");
                lines.push(format!("{}(ts, obj);", function));
                lines.push("CP_CHECK();".to_string());
            }
            Stmt::Throw => {
                lines.push(pop(ValueKind::Ref, "exception"));
                lines.push("classport_throw(ts, exception);".to_string());
                lines.push(format!("goto {};", UNWIND_LABEL));
            }
            Stmt::Return(kind) => match kind {
                Some(kind) => {
                    lines.push(pop(*kind, "r"));
                    lines.push("classport_leave_method(ts, locals);".to_string());
                    lines.push("return r;".to_string());
                }
                None => {
                    lines.push("classport_leave_method(ts, locals);".to_string());
                    lines.push("return;".to_string());
                }
            },
            Stmt::CheckCast(ty) => {
                lines.push(format!(
                    "classport_checkcast(ts, stack[sp - 1].v.o, {});",
                    self.type_ref(ty)?
                ));
                lines.push("CP_CHECK();".to_string());
            }
            Stmt::InstanceOf(ty) => {
                lines.push(pop(ValueKind::Ref, "obj"));
                lines.push(push(
                    ValueKind::Int,
                    &format!("classport_instanceof(ts, obj, {})", self.type_ref(ty)?),
                ));
            }
        }
        Ok(lines)
    }

    fn write_statement<W: Write>(
        &self,
        method: &LoweredMethod,
        stmt: &Stmt,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        if self.config.verbosity.should_print_statements() {
            EmitHelper::write_comment(writer, ctx, &format!("{:?}", stmt))?;
        }
        let lines = self.statement(method, stmt)?;
        if let [line] = lines.as_slice() {
            return EmitHelper::write_line(writer, ctx, line);
        }
        EmitHelper::write_line(writer, ctx, "{")?;
        ctx.indent();
        for line in &lines {
            EmitHelper::write_line(writer, ctx, line)?;
        }
        ctx.dedent();
        EmitHelper::write_line(writer, ctx, "}")
    }

    fn write_entry<W: Write>(
        &self,
        method: &LoweredMethod,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let zero = method.ret.map(c_syntax::zero_value);
        EmitHelper::write_line(
            writer,
            ctx,
            &format!(
                "CP_SLOT* locals = classport_enter_method(ts, {});",
                u32::from(method.max_locals) + u32::from(method.max_stack)
            ),
        )?;
        EmitHelper::write_line(writer, ctx, "CP_SLOT* stack;")?;
        EmitHelper::write_line(writer, ctx, "JAVA_INT sp = 0;")?;
        if !method.handlers.is_empty() {
            // Prologue faults must not match any handler range.
            EmitHelper::write_line(writer, ctx, "JAVA_INT pc = -1;")?;
        }
        if method.is_synchronized {
            EmitHelper::write_line(writer, ctx, "JAVA_INT monitor_held = 0;")?;
        }
        EmitHelper::write_line(
            writer,
            ctx,
            &match zero {
                Some(zero) => format!("if (locals == NULL) return {};", zero),
                None => "if (locals == NULL) return;".to_string(),
            },
        )?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("stack = locals + {};", method.max_locals),
        )?;

        let mut slot = 0u32;
        if !method.is_static {
            EmitHelper::write_line(writer, ctx, "CP_SET_O(0, self);")?;
            slot = 1;
        }
        for (i, kind) in method.params.iter().enumerate() {
            EmitHelper::write_line(
                writer,
                ctx,
                &format!("CP_SET_{}({}, p{});", suffix(*kind), slot, i),
            )?;
            slot += u32::from(kind.slot_width());
        }
        Ok(())
    }

    fn write_unwind<W: Write>(
        &self,
        method: &LoweredMethod,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_label(writer, ctx, UNWIND_LABEL)?;
        if !method.handlers.is_empty() {
            EmitHelper::write_line(writer, ctx, "{")?;
            ctx.indent();
            EmitHelper::write_line(writer, ctx, "JAVA_OBJECT exception = ts->pending_exception;")?;
            for handler in &method.handlers {
                let mut test = format!("pc >= {} && pc < {}", handler.start, handler.end);
                if let Some(catch) = &handler.catch_type {
                    test.push_str(&format!(
                        " && classport_instanceof(ts, exception, {})",
                        self.type_ref(&JavaType::object(catch))?
                    ));
                }
                EmitHelper::write_line(writer, ctx, &format!("if ({}) {{", test))?;
                ctx.indent();
                EmitHelper::write_line(writer, ctx, "ts->pending_exception = NULL;")?;
                EmitHelper::write_line(writer, ctx, "sp = 0;")?;
                EmitHelper::write_line(writer, ctx, &push(ValueKind::Ref, "exception"))?;
                EmitHelper::write_line(
                    writer,
                    ctx,
                    &format!("goto {};", c_syntax::label(handler.handler)),
                )?;
                ctx.dedent();
                EmitHelper::write_line(writer, ctx, "}")?;
            }
            ctx.dedent();
            EmitHelper::write_line(writer, ctx, "}")?;
        }
        if method.is_synchronized {
            EmitHelper::write_line(
                writer,
                ctx,
                &format!(
                    "if (monitor_held) classport_monitor_exit(ts, {});",
                    self.monitor_target(method)?
                ),
            )?;
        }
        if method.count_stmts(|s| *s == Stmt::MonitorEnter) > 0 {
            EmitHelper::write_line(writer, ctx, "classport_release_frame_monitors(ts, locals);")?;
        }
        EmitHelper::write_line(writer, ctx, "classport_leave_method(ts, locals);")?;
        EmitHelper::write_line(
            writer,
            ctx,
            &match method.ret {
                Some(kind) => format!("return {};", c_syntax::zero_value(kind)),
                None => "return;".to_string(),
            },
        )
    }
}

impl Emitter for MethodEmitter<'_> {
    type Item = LoweredMethod;

    fn emit<W: Write>(
        &self,
        method: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        if !method.has_body() {
            bail!("{} has no body to emit", method.qualified_name());
        }
        if self.config.verbosity.should_print_banners() {
            EmitHelper::write_comment(writer, context, &method.qualified_name())?;
        }
        if self.config.verbosity.should_print_layout() {
            EmitHelper::write_comment(
                writer,
                context,
                &format!(
                    "max_stack {}, max_locals {}, {} handlers",
                    method.max_stack,
                    method.max_locals,
                    method.handlers.len()
                ),
            )?;
        }
        let signature = c_syntax::prototype(
            &method.symbol,
            !method.is_static,
            &method.params,
            method.ret,
        );
        EmitHelper::write_line(writer, context, &signature)?;
        EmitHelper::write_line(writer, context, "{")?;
        context.indent();

        self.write_entry(method, writer, context)?;
        for stmt in &method.prologue {
            self.write_statement(method, stmt, writer, context)?;
        }

        // Labels go before the first statement at or after their offset.
        let mut labels: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
        for target in &method.jump_targets {
            let index = method.body.partition_point(|s| s.offset < *target);
            labels.entry(index).or_default().push(*target);
        }
        let mut last_offset = None;
        for (index, lowered) in method.body.iter().enumerate() {
            for target in labels.remove(&index).unwrap_or_default() {
                EmitHelper::write_label(writer, context, &c_syntax::label(target))?;
            }
            if last_offset != Some(lowered.offset) {
                if context.line_comments {
                    EmitHelper::write_comment(writer, context, &format!("@{}", lowered.offset))?;
                }
                if !method.handlers.is_empty() {
                    EmitHelper::write_line(writer, context, &format!("pc = {};", lowered.offset))?;
                }
                last_offset = Some(lowered.offset);
            }
            self.write_statement(method, &lowered.stmt, writer, context)?;
        }
        for target in labels.into_values().flatten() {
            EmitHelper::write_label(writer, context, &c_syntax::label(target))?;
            EmitHelper::write_line(writer, context, ";")?;
        }

        self.write_unwind(method, writer, context)?;
        context.dedent();
        EmitHelper::write_line(writer, context, "}")
    }
}
