use crate::{values::ValueKind, Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical form of a field or method descriptor component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    Object(String),
    /// `element` is never itself an array.
    Array { element: Box<JavaType>, dims: u8 },
}

impl JavaType {
    pub fn object(name: &str) -> Self {
        JavaType::Object(name.to_string())
    }

    pub fn array_of(element: JavaType, dims: u8) -> Self {
        match element {
            JavaType::Array {
                element,
                dims: inner,
            } => JavaType::Array {
                element,
                dims: inner + dims,
            },
            other => JavaType::Array {
                element: Box::new(other),
                dims,
            },
        }
    }

    pub fn parse(descriptor: &str) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let ty = parse_component(bytes, &mut pos)
            .ok_or_else(|| TranslateError::InvalidDescriptor(descriptor.to_string()))?;
        if pos != bytes.len() {
            return Err(TranslateError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Class constants name either a plain class (`pkg/Foo`) or an array descriptor (`[I`).
    pub fn from_class_constant(name: &str) -> Result<Self> {
        if name.starts_with('[') {
            Self::parse(name)
        } else {
            Ok(JavaType::Object(name.to_string()))
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, JavaType::Long | JavaType::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Object(_) | JavaType::Array { .. })
    }

    pub fn slot_width(&self) -> u16 {
        match self {
            JavaType::Void => 0,
            JavaType::Long | JavaType::Double => 2,
            _ => 1,
        }
    }

    /// Kind of the operand-stack entry holding a value of this type. `None` for void.
    pub fn value_kind(&self) -> Option<ValueKind> {
        match self {
            JavaType::Void => None,
            JavaType::Boolean
            | JavaType::Byte
            | JavaType::Char
            | JavaType::Short
            | JavaType::Int => Some(ValueKind::Int),
            JavaType::Long => Some(ValueKind::Long),
            JavaType::Float => Some(ValueKind::Float),
            JavaType::Double => Some(ValueKind::Double),
            JavaType::Object(_) | JavaType::Array { .. } => Some(ValueKind::Ref),
        }
    }

    /// Storage width of one element in bytes; 0 means the element is a reference.
    pub fn primitive_size(&self) -> u8 {
        match self {
            JavaType::Boolean | JavaType::Byte => 1,
            JavaType::Char | JavaType::Short => 2,
            JavaType::Int | JavaType::Float => 4,
            JavaType::Long | JavaType::Double => 8,
            JavaType::Void | JavaType::Object(_) | JavaType::Array { .. } => 0,
        }
    }

    /// The type one dimension down, for array types.
    pub fn component(&self) -> Option<JavaType> {
        match self {
            JavaType::Array { element, dims } if *dims > 1 => Some(JavaType::Array {
                element: element.clone(),
                dims: dims - 1,
            }),
            JavaType::Array { element, .. } => Some((**element).clone()),
            _ => None,
        }
    }

    /// The class this type structurally depends on, if any.
    pub fn referenced_class(&self) -> Option<&str> {
        match self {
            JavaType::Object(name) => Some(name),
            JavaType::Array { element, .. } => element.referenced_class(),
            _ => None,
        }
    }

    pub fn c_type(&self) -> &'static str {
        match self {
            JavaType::Boolean => "JAVA_BOOLEAN",
            JavaType::Byte => "JAVA_BYTE",
            JavaType::Char => "JAVA_CHAR",
            JavaType::Short => "JAVA_SHORT",
            JavaType::Int => "JAVA_INT",
            JavaType::Long => "JAVA_LONG",
            JavaType::Float => "JAVA_FLOAT",
            JavaType::Double => "JAVA_DOUBLE",
            JavaType::Void => "JAVA_VOID",
            JavaType::Object(_) | JavaType::Array { .. } => "JAVA_OBJECT",
        }
    }

    /// Fragment used when building mangled method symbols.
    pub fn mangle_suffix(&self) -> String {
        match self {
            JavaType::Boolean => "boolean".to_string(),
            JavaType::Byte => "byte".to_string(),
            JavaType::Char => "char".to_string(),
            JavaType::Short => "short".to_string(),
            JavaType::Int => "int".to_string(),
            JavaType::Long => "long".to_string(),
            JavaType::Float => "float".to_string(),
            JavaType::Double => "double".to_string(),
            JavaType::Void => "void".to_string(),
            JavaType::Object(name) => crate::codegen::mangle::class_name(name),
            JavaType::Array { element, dims } => {
                format!("{}_{}ARRAY", element.mangle_suffix(), dims)
            }
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Boolean => write!(f, "Z"),
            JavaType::Byte => write!(f, "B"),
            JavaType::Char => write!(f, "C"),
            JavaType::Short => write!(f, "S"),
            JavaType::Int => write!(f, "I"),
            JavaType::Long => write!(f, "J"),
            JavaType::Float => write!(f, "F"),
            JavaType::Double => write!(f, "D"),
            JavaType::Void => write!(f, "V"),
            JavaType::Object(name) => write!(f, "L{};", name),
            JavaType::Array { element, dims } => {
                for _ in 0..*dims {
                    write!(f, "[")?;
                }
                write!(f, "{}", element)
            }
        }
    }
}

fn parse_component(bytes: &[u8], pos: &mut usize) -> Option<JavaType> {
    let tag = *bytes.get(*pos)?;
    *pos += 1;
    let ty = match tag {
        b'Z' => JavaType::Boolean,
        b'B' => JavaType::Byte,
        b'C' => JavaType::Char,
        b'S' => JavaType::Short,
        b'I' => JavaType::Int,
        b'J' => JavaType::Long,
        b'F' => JavaType::Float,
        b'D' => JavaType::Double,
        b'V' => JavaType::Void,
        b'L' => {
            let start = *pos;
            let len = bytes[start..].iter().position(|b| *b == b';')?;
            if len == 0 {
                return None;
            }
            *pos = start + len + 1;
            JavaType::Object(std::str::from_utf8(&bytes[start..start + len]).ok()?.to_string())
        }
        b'[' => {
            let mut dims: u8 = 1;
            while bytes.get(*pos) == Some(&b'[') {
                dims = dims.checked_add(1)?;
                *pos += 1;
            }
            let element = parse_component(bytes, pos)?;
            if element == JavaType::Void {
                return None;
            }
            JavaType::Array {
                element: Box::new(element),
                dims,
            }
        }
        _ => return None,
    };
    Some(ty)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let invalid = || TranslateError::InvalidDescriptor(descriptor.to_string());
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid());
        }
        let mut pos = 1;
        let mut params = Vec::new();
        while bytes.get(pos) != Some(&b')') {
            let param = parse_component(bytes, &mut pos).ok_or_else(invalid)?;
            if param == JavaType::Void {
                return Err(invalid());
            }
            params.push(param);
        }
        pos += 1;
        let ret = parse_component(bytes, &mut pos).ok_or_else(invalid)?;
        if pos != bytes.len() {
            return Err(invalid());
        }
        Ok(Self { params, ret })
    }

    /// Local-variable slots occupied by the arguments, excluding any receiver.
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(JavaType::slot_width).sum()
    }

    pub fn param_kinds(&self) -> Vec<ValueKind> {
        self.params.iter().filter_map(JavaType::value_kind).collect()
    }

    pub fn return_kind(&self) -> Option<ValueKind> {
        self.ret.value_kind()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}
