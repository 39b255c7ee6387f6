//! Input directory loading: every classfile into one table, native companion sources alongside.

use crate::{reader, ParseError, Result};
use classport_core::{ClassTable, NativeSource};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

const NATIVE_EXTENSIONS: &[&str] = &["c", "m"];

#[derive(Debug, Default)]
pub struct LoadedInput {
    pub table: ClassTable,
    pub native_sources: Vec<NativeSource>,
    /// Files present in the input but not read.
    pub skipped: Vec<PathBuf>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Reads every `.class` under `root`. A later class of the same name replaces the earlier one.
/// Supertype links are resolved before returning.
pub fn load_directory(root: &Path) -> Result<LoadedInput> {
    let mut input = LoadedInput::default();
    let mut classes = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| ParseError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if extension == "class" {
            if entry.file_name() == "module-info.class" {
                warn!(path = %path.display(), "skipping module descriptor");
                input.skipped.push(path.to_path_buf());
                continue;
            }
            let bytes = fs::read(path).map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let class = reader::parse_class(&bytes).map_err(|e| e.in_file(path))?;
            let name = class.name.clone();
            if input.table.insert(class).1.is_some() {
                warn!(class = %name, path = %path.display(), "duplicate class replaces earlier definition");
            }
            classes += 1;
        } else if NATIVE_EXTENSIONS.contains(&extension) {
            let contents = fs::read_to_string(path).map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), "native companion source");
            input.native_sources.push(NativeSource {
                path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
                contents,
            });
        } else {
            input.skipped.push(path.to_path_buf());
        }
    }

    let missing_supertypes = input.table.resolve_hierarchy().len();
    info!(
        classes,
        missing_supertypes,
        natives = input.native_sources.len(),
        skipped = input.skipped.len(),
        "loaded input directory"
    );
    Ok(input)
}
