use classport_core::RuntimeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub indent_style: IndentStyle,
    /// Prefix statements with the bytecode offset they were lowered from.
    pub line_comments: bool,
    pub header_name: String,
    pub metadata_name: String,
    pub descriptor_name: String,
    /// Name of the single source file used when every class goes into one unit.
    pub concatenated_name: String,
    pub concatenate: bool,
    pub verbosity: VerbosityLevel,
    /// Limits baked into the runtime header; the check flags decide which guards are emitted.
    pub runtime: RuntimeConfig,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            indent_style: IndentStyle::Spaces(4),
            line_comments: false,
            header_name: "classport_runtime.h".to_string(),
            metadata_name: "classport_metadata.c".to_string(),
            descriptor_name: "build.json".to_string(),
            concatenated_name: "classport_program.c".to_string(),
            concatenate: false,
            verbosity: VerbosityLevel::Normal,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndentStyle {
    Spaces(usize),
    Tabs,
}

impl IndentStyle {
    pub fn to_string(&self) -> String {
        match self {
            IndentStyle::Spaces(n) => " ".repeat(*n),
            IndentStyle::Tabs => "\t".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerbosityLevel {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl VerbosityLevel {
    pub fn should_print_banners(&self) -> bool {
        !matches!(self, VerbosityLevel::Quiet)
    }

    pub fn should_print_layout(&self) -> bool {
        matches!(self, VerbosityLevel::Verbose | VerbosityLevel::Debug)
    }

    pub fn should_print_statements(&self) -> bool {
        matches!(self, VerbosityLevel::Debug)
    }
}
