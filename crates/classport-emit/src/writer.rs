/*! Renders a lowered program into its full output set and writes it out.
 *
 * Rendering happens entirely in memory and only after the linkage check passes, so a failed
 * translation never leaves a partial output directory behind.
 */

use crate::class_unit::{ClassHeaderEmitter, ClassSourceEmitter};
use crate::config::EmitterConfig;
use crate::descriptor::{BuildDescriptor, FileEntry, FileRole};
use crate::emitter::{EmitContext, Emitter};
use crate::linkage::{check_linkage, LinkageReport};
use crate::metadata::MetadataEmitter;
use crate::runtime_header::RuntimeHeaderEmitter;
use crate::tables::SharedTables;
use crate::{EmitError, Result};
use classport_core::codegen::{mangle, LoweredProgram};
use classport_core::BuildManifest;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub role: FileRole,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct RenderedOutput {
    /// File name to contents, in emission order.
    pub files: IndexMap<String, RenderedFile>,
    pub linkage: LinkageReport,
}

impl RenderedOutput {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(|f| f.contents.as_str())
    }

    fn add(&mut self, name: String, role: FileRole, contents: String) -> Result<()> {
        if self.files.contains_key(&name) {
            return Err(EmitError::Render {
                unit: name,
                source: anyhow::anyhow!("two outputs share this file name"),
            });
        }
        self.files.insert(name, RenderedFile { role, contents });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmitSummary {
    pub out_dir: PathBuf,
    pub descriptor_path: PathBuf,
    pub descriptor: BuildDescriptor,
    pub classes: usize,
    pub methods: usize,
}

fn render<E: Emitter>(
    emitter: &E,
    item: &E::Item,
    unit: &str,
    config: &EmitterConfig,
) -> Result<String> {
    let mut buffer = Vec::new();
    let mut context = EmitContext::from_config(config);
    emitter
        .emit(item, &mut buffer, &mut context)
        .map_err(|source| EmitError::Render {
            unit: unit.to_string(),
            source,
        })?;
    String::from_utf8(buffer).map_err(|e| EmitError::Render {
        unit: unit.to_string(),
        source: e.into(),
    })
}

/// Renders every output file. Fails with a linkage gap before anything is rendered.
pub fn render_program(program: &LoweredProgram, config: &EmitterConfig) -> Result<RenderedOutput> {
    let linkage = check_linkage(program)?;
    let tables = SharedTables::build(program);
    debug!(
        types = tables.type_count(),
        strings = tables.string_count(),
        "shared tables built"
    );
    let mut output = RenderedOutput {
        files: IndexMap::new(),
        linkage,
    };

    let header = render(
        &RuntimeHeaderEmitter::new(config),
        &config.runtime,
        &config.header_name,
        config,
    )?;
    output.add(config.header_name.clone(), FileRole::RuntimeHeader, header)?;

    let headers = ClassHeaderEmitter::new(program, config);
    let sources = ClassSourceEmitter::new(program, &tables, config);
    let mut concatenated = String::new();
    for class in &program.classes {
        let name = mangle::header_file(&class.name);
        let contents = render(&headers, class, &name, config)?;
        output.add(name, FileRole::ClassHeader, contents)?;

        let name = mangle::source_file(&class.name);
        let contents = render(&sources, class, &name, config)?;
        if config.concatenate {
            if !concatenated.is_empty() {
                concatenated.push('\n');
            }
            concatenated.push_str(&contents);
        } else {
            output.add(name, FileRole::ClassSource, contents)?;
        }
    }
    if config.concatenate {
        output.add(
            config.concatenated_name.clone(),
            FileRole::ClassSource,
            concatenated,
        )?;
    }

    let metadata = render(
        &MetadataEmitter::new(&tables, config),
        program,
        &config.metadata_name,
        config,
    )?;
    output.add(config.metadata_name.clone(), FileRole::Metadata, metadata)?;

    for source in &program.native_sources {
        let name = source
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EmitError::Render {
                unit: source.path.display().to_string(),
                source: anyhow::anyhow!("native source has no file name"),
            })?;
        output.add(name, FileRole::NativeSource, source.contents.clone())?;
    }
    Ok(output)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Renders the program and writes it, with its `build.json`, into `out_dir`.
pub fn emit_program(
    program: &LoweredProgram,
    out_dir: &Path,
    config: &EmitterConfig,
    manifest: &BuildManifest,
) -> Result<EmitSummary> {
    let mut config = config.clone();
    config.concatenate |= manifest.concatenate;
    let output = render_program(program, &config)?;

    fs::create_dir_all(out_dir).map_err(|source| EmitError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let mut descriptor = BuildDescriptor::new(
        &manifest.display_name,
        &manifest.platform,
        &program.entry_class,
        &program.entry_symbol,
    );
    descriptor.runtime_header = config.header_name.clone();
    for (name, file) in &output.files {
        write_file(&out_dir.join(name), file.contents.as_bytes())?;
        descriptor
            .files
            .push(FileEntry::new(name, file.role, file.contents.as_bytes()));
    }

    let descriptor_path = out_dir.join(&config.descriptor_name);
    write_file(&descriptor_path, descriptor.to_json()?.as_bytes())?;
    let summary = EmitSummary {
        out_dir: out_dir.to_path_buf(),
        descriptor_path,
        classes: program.classes.len(),
        methods: program.methods().filter(|m| m.has_body()).count(),
        descriptor,
    };
    info!(
        out_dir = %summary.out_dir.display(),
        files = summary.descriptor.files.len(),
        classes = summary.classes,
        methods = summary.methods,
        "files written"
    );
    Ok(summary)
}
