/*! The metadata unit: every table the runtime consults by index or by walking.
 *
 * Holds the vtable, interface table and class object of every program class, the class table in
 * class-id order (runtime classes included), the type-descriptor and string-constant tables, the
 * addresses of reference-typed statics for the collector, and the entry point.
 */

use crate::c_syntax;
use crate::class_unit::{constants_symbol, has_string_constants};
use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
use crate::tables::{element_info, SharedTables};
use anyhow::anyhow;
use classport_core::codegen::{mangle, ClassDispatch, LoweredClass, LoweredProgram};
use classport_core::{MethodKey, ValueKind};
use indexmap::IndexMap;
use std::io::Write;

pub struct MetadataEmitter<'a> {
    tables: &'a SharedTables,
    config: &'a EmitterConfig,
}

impl<'a> MetadataEmitter<'a> {
    pub fn new(tables: &'a SharedTables, config: &'a EmitterConfig) -> Self {
        Self { tables, config }
    }

    fn function_address(symbol: Option<&str>) -> String {
        match symbol {
            Some(symbol) => format!("(void*) &{}", symbol),
            None => "NULL".to_string(),
        }
    }

    /// Interface method keys of `dispatch`, each paired with the implementation the class's
    /// vtable holds for it.
    pub fn itable_entries<'p>(
        program: &'p LoweredProgram,
        dispatch: &'p ClassDispatch,
    ) -> IndexMap<&'p MethodKey, Option<&'p str>> {
        let mut entries = IndexMap::new();
        for interface in &dispatch.interfaces {
            let Some(iface) = program.dispatch.get(interface) else {
                continue;
            };
            for entry in &iface.vtable {
                if entries.contains_key(&entry.key) {
                    continue;
                }
                let symbol = dispatch
                    .slot_of(&entry.key)
                    .and_then(|slot| dispatch.entry(slot))
                    .and_then(|e| e.symbol.as_deref());
                entries.insert(&entry.key, symbol);
            }
        }
        entries
    }

    fn emit_vtable<W: Write>(
        &self,
        program: &LoweredProgram,
        dispatch: &ClassDispatch,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let name = mangle::vtable_symbol(&dispatch.class);
        if !dispatch.vtable.is_empty() {
            EmitHelper::write_initializer(writer, ctx, &format!("void* const {}[]", name), |w, c| {
                for entry in &dispatch.vtable {
                    EmitHelper::write_line(
                        w,
                        c,
                        &format!("{},", Self::function_address(entry.symbol.as_deref())),
                    )?;
                }
                Ok(())
            })?;
        }

        let itable = Self::itable_entries(program, dispatch);
        if !itable.is_empty() {
            let name = mangle::itable_symbol(&dispatch.class);
            EmitHelper::write_initializer(
                writer,
                ctx,
                &format!("const CLASSPORT_ITABLE_ENTRY {}[]", name),
                |w, c| {
                    for (key, symbol) in &itable {
                        EmitHelper::write_line(
                            w,
                            c,
                            &format!(
                                "{{ {}, {}, {} }},",
                                c_syntax::string_literal(&key.name),
                                c_syntax::string_literal(&key.descriptor),
                                Self::function_address(*symbol)
                            ),
                        )?;
                    }
                    Ok(())
                },
            )?;
        }
        Ok(())
    }

    fn emit_class_object<W: Write>(
        &self,
        program: &LoweredProgram,
        class: &LoweredClass,
        dispatch: &ClassDispatch,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let interfaces: Vec<&String> = dispatch
            .interfaces
            .iter()
            .filter(|i| program.dispatch.get(i).is_some())
            .collect();
        let interface_list = format!("INTERFACES_{}", mangle::class_name(&class.name));
        if !interfaces.is_empty() {
            EmitHelper::write_initializer(
                writer,
                ctx,
                &format!("static CLASSPORT_CLASS* const {}[]", interface_list),
                |w, c| {
                    for interface in &interfaces {
                        EmitHelper::write_line(w, c, &format!("{},", c_syntax::class_ref(interface)))?;
                    }
                    Ok(())
                },
            )?;
        }

        let mut flags = Vec::new();
        if class.is_interface {
            flags.push("CLASSPORT_CLASS_INTERFACE");
        }
        if class.is_abstract && !class.is_interface {
            flags.push("CLASSPORT_CLASS_ABSTRACT");
        }
        let itable_length = Self::itable_entries(program, dispatch).len();
        let super_ref = dispatch
            .super_name
            .as_deref()
            .filter(|s| program.dispatch.get(s).is_some())
            .map(c_syntax::class_ref)
            .unwrap_or_else(|| "NULL".to_string());
        let instance_size = if class.is_interface {
            "sizeof(CLASSPORT_OBJECT)".to_string()
        } else {
            format!("sizeof({})", c_syntax::instance_struct(&class.name))
        };
        let or_null = |present: bool, name: String| if present { name } else { "NULL".to_string() };

        let members = [
            c_syntax::string_literal(&class.name),
            dispatch.class_id.to_string(),
            if flags.is_empty() {
                "0".to_string()
            } else {
                flags.join(" | ")
            },
            super_ref,
            or_null(!interfaces.is_empty(), interface_list),
            interfaces.len().to_string(),
            instance_size,
            or_null(!dispatch.vtable.is_empty(), mangle::vtable_symbol(&class.name)),
            dispatch.vtable.len().to_string(),
            or_null(itable_length > 0, mangle::itable_symbol(&class.name)),
            itable_length.to_string(),
            or_null(has_string_constants(class), constants_symbol(&class.name)),
            class.clinit_symbol.clone().unwrap_or_else(|| "NULL".to_string()),
        ];
        EmitHelper::write_initializer(
            writer,
            ctx,
            &format!("CLASSPORT_CLASS {}", class.symbol),
            |w, c| {
                for member in &members {
                    EmitHelper::write_line(w, c, &format!("{},", member))?;
                }
                Ok(())
            },
        )
    }

    fn emit_class_table<W: Write>(
        &self,
        program: &LoweredProgram,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let mut classes: Vec<&ClassDispatch> = program.dispatch.iter().collect();
        classes.sort_by_key(|d| d.class_id);
        let refs: Vec<String> = classes.iter().map(|d| c_syntax::class_ref(&d.class)).collect();
        self.emit_array(
            "CLASSPORT_CLASS* const classport_class_table[]",
            &refs,
            "NULL",
            writer,
            ctx,
        )?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("const JAVA_INT classport_class_count = {};", refs.len()),
        )
    }

    fn emit_types<W: Write>(
        &self,
        program: &LoweredProgram,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let rows: Vec<String> = self
            .tables
            .types()
            .map(|ty| {
                let (element, dims, size) = element_info(ty);
                let element = element
                    .filter(|e| program.dispatch.get(e).is_some())
                    .map(c_syntax::class_ref)
                    .unwrap_or_else(|| "NULL".to_string());
                format!(
                    "{{ {}, {}, {}, {} }}",
                    c_syntax::string_literal(&ty.to_string()),
                    element,
                    dims,
                    size
                )
            })
            .collect();
        self.emit_array(
            "const CLASSPORT_TYPE classport_types[]",
            &rows,
            "{ NULL, NULL, 0, 0 }",
            writer,
            ctx,
        )?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("const JAVA_INT classport_type_count = {};", rows.len()),
        )
    }

    fn emit_strings<W: Write>(&self, writer: &mut W, ctx: &mut EmitContext) -> EmitResult {
        let literals: Vec<String> = self.tables.strings().map(|s| c_syntax::string_literal(s)).collect();
        let lengths: Vec<String> = self.tables.strings().map(|s| s.len().to_string()).collect();
        self.emit_array("const char* const classport_strings[]", &literals, "NULL", writer, ctx)?;
        self.emit_array("const JAVA_INT classport_string_lengths[]", &lengths, "0", writer, ctx)?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("const JAVA_INT classport_string_count = {};", literals.len()),
        )
    }

    fn emit_static_roots<W: Write>(
        &self,
        program: &LoweredProgram,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        let roots: Vec<String> = program
            .classes
            .iter()
            .flat_map(|c| c.static_fields.iter())
            .filter(|f| f.ty.value_kind() == Some(ValueKind::Ref))
            .map(|f| format!("&{}", f.symbol))
            .collect();
        self.emit_array(
            "JAVA_OBJECT* const classport_static_roots[]",
            &roots,
            "NULL",
            writer,
            ctx,
        )?;
        EmitHelper::write_line(
            writer,
            ctx,
            &format!("const JAVA_INT classport_static_root_count = {};", roots.len()),
        )
    }

    /// C has no empty array initializers, so an empty table gets one placeholder row.
    fn emit_array<W: Write>(
        &self,
        header: &str,
        rows: &[String],
        placeholder: &str,
        writer: &mut W,
        ctx: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_initializer(writer, ctx, header, |w, c| {
            if rows.is_empty() {
                return EmitHelper::write_line(w, c, &format!("{},", placeholder));
            }
            for row in rows {
                EmitHelper::write_line(w, c, &format!("{},", row))?;
            }
            Ok(())
        })
    }
}

impl Emitter for MetadataEmitter<'_> {
    type Item = LoweredProgram;

    fn emit<W: Write>(
        &self,
        program: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_comment(writer, context, "classport program tables. Generated, do not edit.")?;
        EmitHelper::write_line(
            writer,
            context,
            &format!("#include \"{}\"", self.config.header_name),
        )?;
        for class in &program.classes {
            EmitHelper::write_line(
                writer,
                context,
                &format!("#include \"{}\"", mangle::header_file(&class.name)),
            )?;
        }

        for class in &program.classes {
            let dispatch = program
                .dispatch
                .get(&class.name)
                .ok_or_else(|| anyhow!("no dispatch table for {}", class.name))?;
            if dispatch.is_runtime {
                continue;
            }
            EmitHelper::write_section(writer, context, &class.name)?;
            self.emit_vtable(program, dispatch, writer, context)?;
            self.emit_class_object(program, class, dispatch, writer, context)?;
        }

        EmitHelper::write_section(writer, context, "class table")?;
        self.emit_class_table(program, writer, context)?;
        EmitHelper::write_section(writer, context, "types")?;
        self.emit_types(program, writer, context)?;
        EmitHelper::write_section(writer, context, "strings")?;
        self.emit_strings(writer, context)?;
        EmitHelper::write_section(writer, context, "static roots")?;
        self.emit_static_roots(program, writer, context)?;

        EmitHelper::blank(writer)?;
        EmitHelper::write_line(
            writer,
            context,
            &format!(
                "void* const classport_entry_point = (void*) &{};",
                program.entry_symbol
            ),
        )
    }
}
