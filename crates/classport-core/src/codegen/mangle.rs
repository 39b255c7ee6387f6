//! C symbol naming for classes, methods and statics.

use crate::instructions::MemberRef;
use crate::types::MethodDescriptor;
use crate::Result;

/// `pkg/Outer$Inner` -> `pkg_Outer_Inner`.
pub fn class_name(internal: &str) -> String {
    internal
        .chars()
        .map(|c| match c {
            '/' | '$' | '.' | '-' | ';' | '[' => '_',
            c => c,
        })
        .collect()
}

pub fn class_symbol(class: &str) -> String {
    format!("class__{}", class_name(class))
}

pub fn method_name(name: &str) -> String {
    match name {
        "<init>" => "__INIT__".to_string(),
        "<clinit>" => "__CLINIT__".to_string(),
        other => other.replace('$', "_"),
    }
}

pub fn method_symbol(class: &str, name: &str, descriptor: &MethodDescriptor) -> String {
    let mut symbol = format!("{}_{}__", class_name(class), method_name(name));
    let args: Vec<String> = descriptor.params.iter().map(|p| p.mangle_suffix()).collect();
    symbol.push_str(&args.join("_"));
    if descriptor.ret != crate::types::JavaType::Void {
        symbol.push_str("_R_");
        symbol.push_str(&descriptor.ret.mangle_suffix());
    }
    symbol
}

pub fn member_symbol(member: &MemberRef) -> Result<String> {
    let descriptor = MethodDescriptor::parse(&member.descriptor)?;
    Ok(method_symbol(&member.owner, &member.name, &descriptor))
}

pub fn static_field_symbol(class: &str, field: &str) -> String {
    format!("STATIC_FIELD_{}_{}", class_name(class), field.replace('$', "_"))
}

pub fn vtable_symbol(class: &str) -> String {
    format!("VTABLE_{}", class_name(class))
}

pub fn itable_symbol(class: &str) -> String {
    format!("ITABLE_{}", class_name(class))
}

pub fn header_file(class: &str) -> String {
    format!("{}.h", class_name(class))
}

pub fn source_file(class: &str) -> String {
    format!("{}.c", class_name(class))
}

/// Splits C-ish source text into identifier tokens, used to find symbols named by native code.
pub fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_class_names() {
        assert_eq!(class_name("com/acme/Outer$Inner"), "com_acme_Outer_Inner");
        assert_eq!(class_symbol("java/lang/Object"), "class__java_lang_Object");
    }

    #[test]
    fn test_method_symbols() {
        let main = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(
            method_symbol("app/Main", "main", &main),
            "app_Main_main__java_lang_String_1ARRAY"
        );
        let ctor = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(
            method_symbol("java/lang/Object", "<init>", &ctor),
            "java_lang_Object___INIT____"
        );
        let add = MethodDescriptor::parse("(IJ)J").unwrap();
        assert_eq!(method_symbol("a/B", "add", &add), "a_B_add__int_long_R_long");
        let clinit = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(method_symbol("a/B", "<clinit>", &clinit), "a_B___CLINIT____");
    }

    #[test]
    fn test_identifiers() {
        let tokens: Vec<&str> = identifiers("JAVA_INT a_B_f__int(CODENAME x) { return 0; }").collect();
        assert!(tokens.contains(&"a_B_f__int"));
        assert!(tokens.contains(&"JAVA_INT"));
    }
}
