/*! Turn a lowered program into C translation units.
 *
 * Every live class becomes a header and a source file. The global tables (class ids, vtables,
 * interface keys, type descriptors and interned strings) go into one metadata unit, and a fixed-name
 * runtime-support header declares everything generated code may call. The output set is only
 * written once the linkage check has shown that every referenced symbol is defined somewhere; a
 * `build.json` descriptor then tells an external build tool what to compile.
 */

pub mod c_syntax;
pub mod class_unit;
pub mod config;
pub mod descriptor;
pub mod emitter;
pub mod linkage;
pub mod metadata;
pub mod method_body;
pub mod runtime_header;
pub mod tables;
pub mod writer;

pub use class_unit::{ClassHeaderEmitter, ClassSourceEmitter};
pub use config::{EmitterConfig, IndentStyle, VerbosityLevel};
pub use descriptor::{BuildDescriptor, FileEntry, FileRole};
pub use emitter::{EmitContext, EmitHelper, EmitResult, Emitter};
pub use linkage::{check_linkage, LinkageReport};
pub use metadata::MetadataEmitter;
pub use method_body::MethodEmitter;
pub use runtime_header::RuntimeHeaderEmitter;
pub use tables::SharedTables;
pub use writer::{emit_program, render_program, EmitSummary, RenderedFile, RenderedOutput};

use classport_core::TranslateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("Failed to render {unit}: {source}")]
    Render {
        unit: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize build descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EmitError>;

#[cfg(test)]
mod tests;
