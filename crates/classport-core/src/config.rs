use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_ENTRY_METHOD: &str = "main";
pub const DEFAULT_ENTRY_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// Build manifest handed to the translator next to the classfile directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildManifest {
    pub entry_class: String,
    pub entry_method: String,
    pub entry_descriptor: String,
    pub display_name: String,
    pub platform: String,
    /// Classes kept live regardless of reachability (reflection, resources).
    pub keep_classes: Vec<String>,
    /// Emit every class into a single translation unit instead of one per class.
    pub concatenate: bool,
}

impl Default for BuildManifest {
    fn default() -> Self {
        Self {
            entry_class: String::new(),
            entry_method: DEFAULT_ENTRY_METHOD.to_string(),
            entry_descriptor: DEFAULT_ENTRY_DESCRIPTOR.to_string(),
            display_name: "app".to_string(),
            platform: "native".to_string(),
            keep_classes: Vec::new(),
            concatenate: false,
        }
    }
}

impl BuildManifest {
    pub fn with_entry(entry_class: &str) -> Self {
        Self {
            entry_class: entry_class.to_string(),
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn cull_config(&self) -> CullConfig {
        CullConfig {
            entry_points: vec![(
                self.entry_class.clone(),
                self.entry_method.clone(),
                self.entry_descriptor.clone(),
            )],
            keep_classes: self.keep_classes.clone(),
            native_sources: Vec::new(),
        }
    }
}

/// Hand-written platform code shipped next to the classfiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSource {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CullConfig {
    /// `(class, method name, descriptor)` triples.
    pub entry_points: Vec<(String, String, String)>,
    pub keep_classes: Vec<String>,
    pub native_sources: Vec<NativeSource>,
}

impl CullConfig {
    pub fn entry(class: &str, method: &str, descriptor: &str) -> Self {
        Self {
            entry_points: vec![(
                class.to_string(),
                method.to_string(),
                descriptor.to_string(),
            )],
            ..Self::default()
        }
    }

    pub fn keep(mut self, class: &str) -> Self {
        self.keep_classes.push(class.to_string());
        self
    }

    pub fn with_native_sources(mut self, sources: Vec<NativeSource>) -> Self {
        self.native_sources = sources;
        self
    }
}

/// Limits baked into the runtime-support header and used by the reference runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_call_depth: usize,
    /// Per-thread window of operand-stack and local slots.
    pub object_stack_size: usize,
    pub pending_allocations: usize,
    pub monitor_capacity: usize,
    pub null_checks: bool,
    pub bounds_checks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            object_stack_size: 16536,
            pending_allocations: 4096,
            monitor_capacity: 4096,
            null_checks: true,
            bounds_checks: true,
        }
    }
}
