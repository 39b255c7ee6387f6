use crate::config::EmitterConfig;
use anyhow::Result;
use std::io::Write;

pub type EmitResult = Result<()>;

#[derive(Debug, Clone)]
pub struct EmitContext {
    pub indent_level: usize,
    pub indent_chars: String,
    pub line_comments: bool,
}

impl EmitContext {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_chars: "    ".to_string(),
            line_comments: false,
        }
    }

    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            indent_level: 0,
            indent_chars: config.indent_style.to_string(),
            line_comments: config.line_comments,
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn get_indent(&self) -> String {
        self.indent_chars.repeat(self.indent_level)
    }

    pub fn nested(&self) -> Self {
        let mut ctx = self.clone();
        ctx.indent();
        ctx
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Emitter {
    type Item;

    fn emit<W: Write>(
        &self,
        item: &Self::Item,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult;

    fn emit_to_string(&self, item: &Self::Item) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = EmitContext::new();
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct EmitHelper;

impl EmitHelper {
    pub fn write_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        writeln!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn write<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        write!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn blank<W: Write>(writer: &mut W) -> EmitResult {
        writeln!(writer)?;
        Ok(())
    }

    /// Label lines sit one level left of the statements around them.
    pub fn write_label<W: Write>(writer: &mut W, context: &EmitContext, label: &str) -> EmitResult {
        let mut outer = context.clone();
        outer.dedent();
        Self::write_line(writer, &outer, &format!("{}:", label))
    }

    pub fn write_comment<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        comment: &str,
    ) -> EmitResult {
        Self::write_line(writer, context, &format!("/* {} */", comment.replace("*/", "* /")))
    }

    pub fn write_section<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        title: &str,
    ) -> EmitResult {
        writeln!(writer)?;
        Self::write_comment(writer, context, &format!("=== {} ===", title))?;
        Ok(())
    }

    pub fn write_block<W: Write, F>(
        writer: &mut W,
        context: &mut EmitContext,
        header: &str,
        body: F,
    ) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        Self::write_line(writer, context, &format!("{} {{", header))?;
        context.indent();
        body(writer, context)?;
        context.dedent();
        Self::write_line(writer, context, "}")?;
        Ok(())
    }

    /// Like [`write_block`](Self::write_block) but closes with `};`, for initializers.
    pub fn write_initializer<W: Write, F>(
        writer: &mut W,
        context: &mut EmitContext,
        header: &str,
        body: F,
    ) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        Self::write_line(writer, context, &format!("{} = {{", header))?;
        context.indent();
        body(writer, context)?;
        context.dedent();
        Self::write_line(writer, context, "};")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndentStyle;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_context_indentation() {
        let mut ctx = EmitContext::new();
        assert_eq!(ctx.indent_level, 0);
        assert_eq!(ctx.get_indent(), "");

        ctx.indent();
        ctx.indent();
        assert_eq!(ctx.get_indent(), "        ");

        ctx.dedent();
        ctx.dedent();
        ctx.dedent();
        assert_eq!(ctx.indent_level, 0);
    }

    #[test]
    fn test_nested_context() {
        let ctx = EmitContext::new();
        let nested = ctx.nested();
        assert_eq!(ctx.indent_level, 0);
        assert_eq!(nested.nested().indent_level, 2);
    }

    #[test]
    fn test_context_from_config_uses_tabs() {
        let config = EmitterConfig {
            indent_style: IndentStyle::Tabs,
            line_comments: true,
            ..EmitterConfig::default()
        };
        let mut ctx = EmitContext::from_config(&config);
        ctx.indent();
        assert_eq!(ctx.get_indent(), "\t");
        assert!(ctx.line_comments);
    }

    #[test]
    fn test_write_comment_escapes_terminator() {
        let mut buffer = Vec::new();
        let ctx = EmitContext::new();
        EmitHelper::write_comment(&mut buffer, &ctx, "a */ b").unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "/* a * / b */\n");
    }

    #[test]
    fn test_write_label_is_outdented() {
        let mut buffer = Vec::new();
        let ctx = EmitContext::new().nested();
        EmitHelper::write_label(&mut buffer, &ctx, "L_4").unwrap();
        EmitHelper::write_line(&mut buffer, &ctx, "sp -= 1;").unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "L_4:\n    sp -= 1;\n");
    }

    #[test]
    fn test_write_block_and_initializer() {
        let mut buffer = Vec::new();
        let mut ctx = EmitContext::new();
        EmitHelper::write_block(&mut buffer, &mut ctx, "void f(void)", |w, c| {
            EmitHelper::write_line(w, c, "return;")
        })
        .unwrap();
        EmitHelper::write_initializer(&mut buffer, &mut ctx, "int xs[]", |w, c| {
            EmitHelper::write_line(w, c, "1,")
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "void f(void) {\n    return;\n}\nint xs[] = {\n    1,\n};\n"
        );
    }
}
