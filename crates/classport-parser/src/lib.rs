/*! Decode binary classfiles into classport IR.
 *
 * The on-disk layout is read with binrw into raw structures that mirror the classfile format; a
 * second step resolves constant pool references, decodes bytecode and produces the
 * [`ClassRecord`]s the rest of the translator works on. The [`loader`] walks an input directory,
 * and [`writer`] goes the other way for tests and tooling that need real classfiles.
 */

use classport_core::{ClassRecord, TranslateError};
use std::path::PathBuf;
use thiserror::Error;

pub mod bytecode;
pub mod classfile;
pub mod constant_pool;
pub mod loader;
pub mod reader;
pub mod signature;
pub mod writer;

pub use loader::{load_directory, LoadedInput};
pub use reader::{parse_class, MIN_MAJOR_VERSION, MAX_MAJOR_VERSION};
pub use writer::write_class;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("binary layout: {0}")]
    Binary(#[from] binrw::Error),
    #[error("unsupported classfile version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("invalid constant pool index {0}")]
    BadIndex(u16),
    #[error("constant pool entry {index} is {found}, expected {expected}")]
    WrongEntry {
        index: u16,
        expected: &'static str,
        found: String,
    },
    #[error("invalid modified UTF-8 in constant pool entry {0}")]
    BadUtf8(u16),
    #[error("bytecode truncated at offset {0}")]
    Truncated(u32),
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },
    #[error("unsupported instruction {name} in {method} at offset {offset}")]
    UnsupportedOpcode {
        method: String,
        name: &'static str,
        offset: u32,
    },
    #[error("malformed {attribute} attribute: {reason}")]
    Attribute { attribute: String, reason: String },
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ParseError>,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

impl ParseError {
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        ParseError::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Maps to the translator's error, naming the class (or file) being read.
    pub fn into_translate(self, class: &str) -> TranslateError {
        match self {
            ParseError::Translate(err) => err,
            ParseError::UnsupportedOpcode {
                method,
                name,
                offset,
            } => TranslateError::UnsupportedInstruction {
                method,
                offset,
                instruction: name.to_string(),
            },
            ParseError::InFile { path, source } => {
                source.into_translate(&path.display().to_string())
            }
            other => TranslateError::MalformedClassfile {
                class: class.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<ParseError> for TranslateError {
    fn from(err: ParseError) -> Self {
        err.into_translate("<input>")
    }
}

/// Parses one classfile, reporting failures the way the translator does.
pub fn parse_classfile(label: &str, bytes: &[u8]) -> classport_core::Result<ClassRecord> {
    parse_class(bytes).map_err(|e| e.into_translate(label))
}
