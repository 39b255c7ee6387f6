//! Generic `Signature` attribute decoding, used only to collect the classes a signature names.

use std::collections::BTreeSet;

struct SignatureReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    classes: BTreeSet<String>,
}

impl<'a> SignatureReader<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> Option<()> {
        (self.peek()? == byte).then(|| self.pos += 1)
    }

    fn identifier(&mut self, stops: &[u8]) -> Option<&'a str> {
        let start = self.pos;
        while !stops.contains(&self.peek()?) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).ok()
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.eat(b'<')?;
        while self.peek()? != b'>' {
            self.identifier(b":")?;
            // Class bound may be empty; interface bounds follow with one colon each.
            self.eat(b':')?;
            if self.peek()? != b':' && self.peek()? != b'>' && !self.at_parameter_name() {
                self.reference_type()?;
            }
            while self.peek()? == b':' {
                self.pos += 1;
                self.reference_type()?;
            }
        }
        self.eat(b'>')
    }

    /// A bound is always `L`, `T` or `[`, so anything else starts the next parameter name.
    fn at_parameter_name(&self) -> bool {
        !matches!(self.peek(), Some(b'L') | Some(b'T') | Some(b'['))
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => {
                self.pos += 1;
                Some(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.pos += 1;
                self.identifier(b";")?;
                self.eat(b';')
            }
            b'[' => {
                self.pos += 1;
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.eat(b'L')?;
        let mut name = self.identifier(b"<.;")?.to_string();
        self.classes.insert(name.clone());
        loop {
            if self.peek()? == b'<' {
                self.type_arguments()?;
            }
            match self.peek()? {
                b'.' => {
                    self.pos += 1;
                    let inner = self.identifier(b"<.;")?;
                    name = format!("{}${}", name, inner);
                    self.classes.insert(name.clone());
                }
                b';' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.eat(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => self.pos += 1,
                b'+' | b'-' => {
                    self.pos += 1;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.eat(b'>')
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek()? == b'<' {
            self.type_parameters()?;
        }
        if self.peek()? == b'(' {
            self.pos += 1;
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.pos += 1;
            self.java_type()?;
            while self.eat(b'^').is_some() {
                self.reference_type()?;
            }
        } else {
            while self.pos < self.bytes.len() {
                self.reference_type()?;
            }
        }
        (self.pos == self.bytes.len()).then_some(())
    }
}

/// Every class named in a field, method or class signature, inner classes as `Outer$Inner`.
/// `None` if the signature does not parse.
pub fn referenced_classes(signature: &str) -> Option<BTreeSet<String>> {
    let mut reader = SignatureReader {
        bytes: signature.as_bytes(),
        pos: 0,
        classes: BTreeSet::new(),
    };
    reader.signature()?;
    Some(reader.classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(sig: &str) -> Vec<String> {
        referenced_classes(sig).unwrap().into_iter().collect()
    }

    #[test]
    fn test_field_generic_container() {
        assert_eq!(
            names("Ljava/util/List<Lapp/model/Invoice;>;"),
            vec!["app/model/Invoice", "java/util/List"]
        );
        assert_eq!(
            names("Ljava/util/Map<Ljava/lang/String;+[Lapp/Row;>;"),
            vec!["app/Row", "java/lang/String", "java/util/Map"]
        );
    }

    #[test]
    fn test_class_and_method_signatures() {
        assert_eq!(
            names("<T:Ljava/lang/Object;U::Ljava/lang/Comparable<TT;>;>Lapp/Base<TT;>;Lapp/Face;"),
            vec!["app/Base", "app/Face", "java/lang/Comparable", "java/lang/Object"]
        );
        assert_eq!(
            names("<E:Ljava/lang/Exception;>(TE;Lapp/Outer<*>.Inner;)V^TE;"),
            vec!["app/Outer", "app/Outer$Inner", "java/lang/Exception"]
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(referenced_classes("Ljava/util/List<"), None);
        assert_eq!(referenced_classes("Q"), None);
    }
}
