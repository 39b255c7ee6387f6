/*! Per-class header and source units.
 *
 * The header of a class declares its instance layout (the superclass layout embedded as the first
 * member, so an object pointer converts to any of its superclasses), its class object, its static
 * storage and a prototype for every method with a C body. The source unit defines the statics and
 * the method bodies.
 */

use crate::c_syntax;
use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
use crate::method_body::MethodEmitter;
use crate::tables::SharedTables;
use classport_core::codegen::runtime_contract;
use classport_core::codegen::{mangle, Dispatch, LoweredClass, LoweredProgram, Stmt};
use classport_core::{ConstantValue, JavaType};
use std::collections::BTreeSet;
use std::io::Write;

/// Name of the function that stores a class's string-valued static constants.
pub fn constants_symbol(class: &str) -> String {
    format!("{}___CONSTANTS__", mangle::class_name(class))
}

pub fn has_string_constants(class: &LoweredClass) -> bool {
    class
        .static_fields
        .iter()
        .any(|f| matches!(f.constant, Some(ConstantValue::String(_))))
}

/// Whether `class` gets an instance struct of its own in its header.
fn declares_struct(class: &LoweredClass) -> bool {
    !class.is_interface && !runtime_contract::is_runtime_class(&class.name)
}

pub struct ClassHeaderEmitter<'a> {
    program: &'a LoweredProgram,
    config: &'a EmitterConfig,
}

impl<'a> ClassHeaderEmitter<'a> {
    pub fn new(program: &'a LoweredProgram, config: &'a EmitterConfig) -> Self {
        Self { program, config }
    }

    fn parent_member(&self, class: &LoweredClass) -> String {
        match class.super_name.as_deref() {
            Some(parent)
                if self.program.class(parent).is_some()
                    || runtime_contract::runtime_class(parent).is_some() =>
            {
                format!("{} parent;", c_syntax::instance_struct(parent))
            }
            _ => "CLASSPORT_OBJECT header;".to_string(),
        }
    }

    fn emit_struct<W: Write>(
        &self,
        class: &LoweredClass,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let header = c_syntax::instance_struct(&class.name);
        EmitHelper::write_line(writer, ctx, &format!("{} {{", header))?;
        ctx.indent();
        EmitHelper::write_line(writer, ctx, &self.parent_member(class))?;
        for (name, ty) in &class.instance_fields {
            EmitHelper::write_line(
                writer,
                ctx,
                &format!("{} {};", ty.c_type(), c_syntax::field_member(name)),
            )?;
        }
        ctx.dedent();
        EmitHelper::write_line(writer, ctx, "};")
    }
}

impl Emitter for ClassHeaderEmitter<'_> {
    type Item = LoweredClass;

    fn emit<W: Write>(
        &self,
        class: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let guard = c_syntax::include_guard(&mangle::header_file(&class.name));
        EmitHelper::write_comment(writer, context, &format!("{}. Generated, do not edit.", class.name))?;
        EmitHelper::write_line(writer, context, &format!("#ifndef {}", guard))?;
        EmitHelper::write_line(writer, context, &format!("#define {}", guard))?;
        EmitHelper::blank(writer)?;
        EmitHelper::write_line(
            writer,
            context,
            &format!("#include \"{}\"", self.config.header_name),
        )?;
        if let Some(parent) = class.super_name.as_deref() {
            if self.program.class(parent).is_some() {
                EmitHelper::write_line(
                    writer,
                    context,
                    &format!("#include \"{}\"", mangle::header_file(parent)),
                )?;
            }
        }
        EmitHelper::blank(writer)?;

        if declares_struct(class) {
            self.emit_struct(class, writer, context)?;
            EmitHelper::blank(writer)?;
        }
        EmitHelper::write_line(
            writer,
            context,
            &format!("extern CLASSPORT_CLASS {};", class.symbol),
        )?;
        for field in &class.static_fields {
            EmitHelper::write_line(
                writer,
                context,
                &format!("extern {} {};", field.ty.c_type(), field.symbol),
            )?;
        }
        if has_string_constants(class) {
            EmitHelper::write_line(
                writer,
                context,
                &format!(
                    "void {}({}* ts);",
                    constants_symbol(&class.name),
                    c_syntax::THREAD_STATE
                ),
            )?;
        }
        for method in class.methods.iter().filter(|m| !m.is_abstract) {
            EmitHelper::write_line(
                writer,
                context,
                &format!(
                    "{};",
                    c_syntax::prototype(&method.symbol, !method.is_static, &method.params, method.ret)
                ),
            )?;
        }
        EmitHelper::blank(writer)?;
        EmitHelper::write_line(writer, context, &format!("#endif /* {} */", guard))
    }
}

pub struct ClassSourceEmitter<'a> {
    program: &'a LoweredProgram,
    tables: &'a SharedTables,
    config: &'a EmitterConfig,
}

impl<'a> ClassSourceEmitter<'a> {
    pub fn new(
        program: &'a LoweredProgram,
        tables: &'a SharedTables,
        config: &'a EmitterConfig,
    ) -> Self {
        Self {
            program,
            tables,
            config,
        }
    }

    /// Program classes whose declarations the method bodies of `class` need.
    pub fn referenced_classes(&self, class: &LoweredClass) -> BTreeSet<String> {
        let mut classes = BTreeSet::new();
        let stmts = class
            .methods
            .iter()
            .flat_map(|m| m.prologue.iter().chain(m.body.iter().map(|s| &s.stmt)));
        for stmt in stmts {
            let named = match stmt {
                Stmt::GetField(target)
                | Stmt::PutField(target)
                | Stmt::GetStatic(target)
                | Stmt::PutStatic(target) => Some(target.owner.clone()),
                Stmt::New(name) | Stmt::ClassInit(name) => Some(name.clone()),
                Stmt::Invoke(call) => match &call.dispatch {
                    Dispatch::Direct { symbol } => self
                        .program
                        .method_by_symbol(symbol)
                        .map(|m| m.class.clone()),
                    _ => None,
                },
                _ => None,
            };
            if let Some(name) = named {
                if name != class.name && self.program.class(&name).is_some() {
                    classes.insert(name);
                }
            }
        }
        classes
    }

    fn static_initializer(&self, ty: &JavaType, constant: Option<&ConstantValue>) -> String {
        constant
            .and_then(c_syntax::numeric_literal)
            .unwrap_or_else(|| {
                match ty.value_kind() {
                    Some(kind) => c_syntax::zero_value(kind),
                    None => "0",
                }
                .to_string()
            })
    }

    fn emit_constants<W: Write>(
        &self,
        class: &LoweredClass,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let header = format!(
            "void {}({}* ts)",
            constants_symbol(&class.name),
            c_syntax::THREAD_STATE
        );
        let mut assignments = Vec::new();
        for field in &class.static_fields {
            if let Some(ConstantValue::String(text)) = &field.constant {
                let index = self.tables.string_index(text).ok_or_else(|| {
                    anyhow::anyhow!("constant of {} was not interned", field.symbol)
                })?;
                assignments.push(format!(
                    "{} = classport_string_constant(ts, {});",
                    field.symbol, index
                ));
            }
        }
        EmitHelper::write_block(writer, ctx, &header, |w, c| {
            for line in &assignments {
                EmitHelper::write_line(w, c, line)?;
            }
            Ok(())
        })
    }
}

impl Emitter for ClassSourceEmitter<'_> {
    type Item = LoweredClass;

    fn emit<W: Write>(
        &self,
        class: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_comment(writer, context, &format!("{}. Generated, do not edit.", class.name))?;
        EmitHelper::write_line(
            writer,
            context,
            &format!("#include \"{}\"", mangle::header_file(&class.name)),
        )?;
        for other in self.referenced_classes(class) {
            EmitHelper::write_line(
                writer,
                context,
                &format!("#include \"{}\"", mangle::header_file(&other)),
            )?;
        }

        if !class.static_fields.is_empty() {
            EmitHelper::write_section(writer, context, "static fields")?;
            for field in &class.static_fields {
                EmitHelper::write_line(
                    writer,
                    context,
                    &format!(
                        "{} {} = {};",
                        field.ty.c_type(),
                        field.symbol,
                        self.static_initializer(&field.ty, field.constant.as_ref())
                    ),
                )?;
            }
            if has_string_constants(class) {
                EmitHelper::blank(writer)?;
                self.emit_constants(class, writer, context)?;
            }
        }

        let methods = MethodEmitter::new(self.tables, self.config);
        for method in class.methods.iter().filter(|m| m.has_body()) {
            EmitHelper::blank(writer)?;
            methods.emit(method, writer, context)?;
        }
        Ok(())
    }
}
