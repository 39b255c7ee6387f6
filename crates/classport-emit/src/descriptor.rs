/*! `build.json`: what an external build tool needs to compile the emitted output.
 *
 * Lists every file with its role and SHA-256 digest, so a build can tell which units changed, plus
 * the entry symbol and the display name and platform carried over from the build manifest.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    RuntimeHeader,
    ClassHeader,
    ClassSource,
    Metadata,
    NativeSource,
}

impl FileRole {
    /// Whether the file is handed to the C compiler.
    pub fn is_compiled(self) -> bool {
        matches!(
            self,
            FileRole::ClassSource | FileRole::Metadata | FileRole::NativeSource
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub role: FileRole,
    pub sha256: String,
    pub bytes: usize,
}

impl FileEntry {
    pub fn new(path: &str, role: FileRole, contents: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            role,
            sha256: hex_digest(contents),
            bytes: contents.len(),
        }
    }
}

pub fn hex_digest(contents: &[u8]) -> String {
    Sha256::digest(contents)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub generator: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub display_name: String,
    pub platform: String,
    pub entry_class: String,
    pub entry_symbol: String,
    pub runtime_header: String,
    pub files: Vec<FileEntry>,
}

impl BuildDescriptor {
    pub fn new(display_name: &str, platform: &str, entry_class: &str, entry_symbol: &str) -> Self {
        Self {
            generator: "classport".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            display_name: display_name.to_string(),
            platform: platform.to_string(),
            entry_class: entry_class.to_string(),
            entry_symbol: entry_symbol.to_string(),
            runtime_header: String::new(),
            files: Vec::new(),
        }
    }

    /// Paths of the files to compile, in emission order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.role.is_compiled())
            .map(|f| f.path.as_str())
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_digest_of_empty_input() {
        assert_eq!(
            hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sources_skip_headers() {
        let mut descriptor = BuildDescriptor::new("demo", "native", "app/Main", "app_Main_main");
        descriptor
            .files
            .push(FileEntry::new("classport_runtime.h", FileRole::RuntimeHeader, b"h"));
        descriptor
            .files
            .push(FileEntry::new("app_Main.c", FileRole::ClassSource, b"c"));
        descriptor
            .files
            .push(FileEntry::new("native.c", FileRole::NativeSource, b"n"));

        assert_eq!(descriptor.sources().collect::<Vec<_>>(), vec!["app_Main.c", "native.c"]);
        assert_eq!(descriptor.file("native.c").map(|f| f.bytes), Some(1));
    }

    #[test]
    fn test_descriptor_json_uses_snake_case_roles() {
        let mut descriptor = BuildDescriptor::new("demo", "native", "app/Main", "app_Main_main");
        descriptor
            .files
            .push(FileEntry::new("classport_metadata.c", FileRole::Metadata, b"m"));
        let json = descriptor.to_json().unwrap();
        assert!(json.contains("\"role\": \"metadata\""));
        let parsed = BuildDescriptor::from_json(&json).unwrap();
        assert_eq!(parsed, descriptor);
    }
}
