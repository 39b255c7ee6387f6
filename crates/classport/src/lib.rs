/*! Unified interface for ahead-of-time classfile translation.
 *
 * Single import for the whole toolchain: loading a classfile directory, culling it down to what the
 * entry point can reach, lowering the survivors and writing out C translation units, plus the
 * reference runtime for running lowered programs without a C compiler.
 */

pub use classport_core as core;
pub use classport_emit as emit;
pub use classport_parser as parser;
pub use classport_runtime as runtime;

pub use classport_core::{
    cull, lower_program, BuildManifest, ClassRecord, ClassTable, CullConfig, CullReport,
    LoweredProgram, MethodRecord, RuntimeConfig, TranslateError,
};

pub use classport_emit::{emit_program, render_program, BuildDescriptor, EmitSummary, EmitterConfig};

pub use classport_parser::{load_directory, parse_class, write_class, LoadedInput};

pub use classport_runtime::{Executor, Outcome, Program, Value};

pub mod pipeline;

pub use pipeline::{ClassSummary, Inspection, Lowered, Translation, TranslationPipeline};
