//! C spellings of literals, names and signatures shared by every unit.

use classport_core::codegen::mangle;
use classport_core::{ConstantValue, ValueKind};

pub const THREAD_STATE: &str = "CLASSPORT_THREAD_STATE";
pub const UNWIND_LABEL: &str = "cp_unwind";

pub fn label(offset: u32) -> String {
    format!("L_{}", offset)
}

pub fn int_literal(value: i32) -> String {
    if value == i32::MIN {
        "(-2147483647 - 1)".to_string()
    } else {
        value.to_string()
    }
}

pub fn long_literal(value: i64) -> String {
    if value == i64::MIN {
        "(-INT64_C(9223372036854775807) - 1)".to_string()
    } else {
        format!("INT64_C({})", value)
    }
}

/// Exact hexadecimal spelling of a finite double, e.g. `0x1.8p+0` for 1.5.
pub fn hex_float(value: f64) -> String {
    let bits = value.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let exponent = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & 0x000f_ffff_ffff_ffff;
    if exponent == 0 && mantissa == 0 {
        return format!("{}0.0", sign);
    }
    let (lead, exp) = if exponent == 0 {
        (0, -1022)
    } else {
        (1, exponent - 1023)
    };
    let mut digits = format!("{:013x}", mantissa);
    while digits.ends_with('0') {
        digits.pop();
    }
    if digits.is_empty() {
        format!("{}0x{}p{:+}", sign, lead, exp)
    } else {
        format!("{}0x{}.{}p{:+}", sign, lead, digits, exp)
    }
}

pub fn float_literal(value: f32) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INFINITY" } else { "(-INFINITY)" }.to_string()
    } else {
        format!("{}f", hex_float(f64::from(value)))
    }
}

pub fn double_literal(value: f64) -> String {
    if value.is_nan() {
        "((JAVA_DOUBLE) NAN)".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "((JAVA_DOUBLE) INFINITY)"
        } else {
            "((JAVA_DOUBLE) -INFINITY)"
        }
        .to_string()
    } else {
        hex_float(value)
    }
}

/// Numeric constants only; string and class constants need the runtime.
pub fn numeric_literal(value: &ConstantValue) -> Option<String> {
    match value {
        ConstantValue::Int(v) => Some(int_literal(*v)),
        ConstantValue::Long(v) => Some(long_literal(*v)),
        ConstantValue::Float(v) => Some(float_literal(*v)),
        ConstantValue::Double(v) => Some(double_literal(*v)),
        ConstantValue::String(_) | ConstantValue::Class(_) => None,
    }
}

/// A C string literal holding the UTF-8 bytes of `text`. Octal escapes never swallow a following
/// digit, unlike hex ones.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for byte in text.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(byte as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out.push('"');
    out
}

pub fn zero_value(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Ref => "NULL",
        _ => "0",
    }
}

pub fn return_type(ret: Option<ValueKind>) -> &'static str {
    ret.map(ValueKind::c_type).unwrap_or("void")
}

pub fn instance_struct(class: &str) -> String {
    format!("struct {}_object", mangle::class_name(class))
}

pub fn field_member(name: &str) -> String {
    format!("f_{}", name.replace('$', "_"))
}

pub fn class_ref(class: &str) -> String {
    format!("&{}", mangle::class_symbol(class))
}

/// Parameter list of a generated function, thread state first.
pub fn parameter_list(has_receiver: bool, params: &[ValueKind]) -> String {
    let mut parts = vec![format!("{}* ts", THREAD_STATE)];
    if has_receiver {
        parts.push("JAVA_OBJECT self".to_string());
    }
    parts.extend(
        params
            .iter()
            .enumerate()
            .map(|(i, kind)| format!("{} p{}", kind.c_type(), i)),
    );
    parts.join(", ")
}

pub fn prototype(
    symbol: &str,
    has_receiver: bool,
    params: &[ValueKind],
    ret: Option<ValueKind>,
) -> String {
    format!(
        "{} {}({})",
        return_type(ret),
        symbol,
        parameter_list(has_receiver, params)
    )
}

/// Cast target for calling through a table entry.
pub fn function_pointer(has_receiver: bool, params: &[ValueKind], ret: Option<ValueKind>) -> String {
    let mut parts = vec![format!("{}*", THREAD_STATE)];
    if has_receiver {
        parts.push("JAVA_OBJECT".to_string());
    }
    parts.extend(params.iter().map(|kind| kind.c_type().to_string()));
    format!("{} (*)({})", return_type(ret), parts.join(", "))
}

pub fn include_guard(file_name: &str) -> String {
    let mut guard: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    guard.push('_');
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_extremes() {
        assert_eq!(int_literal(-5), "-5");
        assert_eq!(int_literal(i32::MIN), "(-2147483647 - 1)");
        assert_eq!(long_literal(1 << 40), "INT64_C(1099511627776)");
        assert_eq!(long_literal(i64::MIN), "(-INT64_C(9223372036854775807) - 1)");
    }

    #[test]
    fn test_hex_floats_are_exact() {
        assert_eq!(hex_float(1.5), "0x1.8p+0");
        assert_eq!(hex_float(1.0), "0x1p+0");
        assert_eq!(hex_float(-0.0), "-0.0");
        assert_eq!(hex_float(0.1), "0x1.999999999999ap-4");
        assert_eq!(float_literal(0.1), "0x1.99999ap-4f");
        assert_eq!(float_literal(f32::NEG_INFINITY), "(-INFINITY)");
        assert_eq!(double_literal(f64::NAN), "((JAVA_DOUBLE) NAN)");
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(string_literal("é1"), "\"\\303\\2511\"");
        assert_eq!(string_literal("??="), "\"\\?\\?=\"");
    }

    #[test]
    fn test_signatures() {
        assert_eq!(
            prototype("a_B_f__int_R_long", true, &[ValueKind::Int], Some(ValueKind::Long)),
            "JAVA_LONG a_B_f__int_R_long(CLASSPORT_THREAD_STATE* ts, JAVA_OBJECT self, JAVA_INT p0)"
        );
        assert_eq!(
            function_pointer(false, &[], None),
            "void (*)(CLASSPORT_THREAD_STATE*)"
        );
        assert_eq!(include_guard("app_Main.h"), "APP_MAIN_H_");
        assert_eq!(instance_struct("app/Outer$Inner"), "struct app_Outer_Inner_object");
    }
}
