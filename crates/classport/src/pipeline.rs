/*! The end-to-end pipeline: load a classfile directory, cull, lower, emit.
 *
 * Each stage owns the class table in turn. Loading populates it, culling marks it and lowering and
 * emission only read it, so the table is passed along by value rather than shared.
 */

use anyhow::{bail, Context, Result};
use classport_core::{
    cull, lower_program, BuildManifest, ClassTable, CullReport, LoweredProgram, RuntimeConfig,
    TranslateError,
};
use classport_emit::{emit_program, EmitSummary, EmitterConfig};
use classport_parser::{load_directory, LoadedInput};
use classport_runtime::{Executor, Program};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `app.Main` -> `app/Main`. Internal names pass through unchanged.
pub fn internal_name(class: &str) -> String {
    class.replace('.', "/")
}

#[derive(Debug, Clone)]
pub struct TranslationPipeline {
    manifest: BuildManifest,
    emitter: EmitterConfig,
}

/// A culled and lowered input, ready to emit or run.
#[derive(Debug)]
pub struct Lowered {
    pub table: ClassTable,
    pub report: CullReport,
    pub program: LoweredProgram,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Translation {
    pub report: CullReport,
    pub summary: EmitSummary,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub super_name: Option<String>,
    pub interface: bool,
    pub live: bool,
    pub methods: usize,
    pub live_methods: usize,
    pub fields: usize,
}

/// What `inspect` reports: every loaded class and the cull summary, with nothing emitted.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub entry_class: String,
    pub classes: Vec<ClassSummary>,
    pub report: CullReport,
    pub native_sources: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl Inspection {
    pub fn class(&self, name: &str) -> Option<&ClassSummary> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn live_classes(&self) -> impl Iterator<Item = &ClassSummary> {
        self.classes.iter().filter(|c| c.live)
    }
}

impl TranslationPipeline {
    pub fn new(mut manifest: BuildManifest) -> Self {
        manifest.entry_class = internal_name(&manifest.entry_class);
        manifest.keep_classes = manifest.keep_classes.iter().map(|c| internal_name(c)).collect();
        Self {
            manifest,
            emitter: EmitterConfig::default(),
        }
    }

    pub fn from_manifest_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest = BuildManifest::from_json(&text)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        Ok(Self::new(manifest))
    }

    pub fn with_entry(mut self, class: &str) -> Self {
        self.manifest.entry_class = internal_name(class);
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.manifest.display_name = name.to_string();
        self
    }

    pub fn with_emitter_config(mut self, config: EmitterConfig) -> Self {
        self.emitter = config;
        self
    }

    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    pub fn emitter_config(&self) -> &EmitterConfig {
        &self.emitter
    }

    fn entry(&self) -> Result<(&str, &str, &str)> {
        if self.manifest.entry_class.is_empty() {
            bail!("No entry class: set entry_class in the manifest or pass --entry");
        }
        Ok((
            &self.manifest.entry_class,
            &self.manifest.entry_method,
            &self.manifest.entry_descriptor,
        ))
    }

    pub fn load(&self, input: &Path) -> Result<LoadedInput> {
        if !input.is_dir() {
            bail!("Input {} is not a directory", input.display());
        }
        load_directory(input)
            .map_err(TranslateError::from)
            .with_context(|| format!("Failed to load {}", input.display()))
    }

    fn cull_input(&self, loaded: &mut LoadedInput) -> Result<CullReport> {
        let (class, method, _) = self.entry()?;
        if !loaded.table.contains(class) {
            return Err(TranslateError::EntryPointNotFound {
                class: class.to_string(),
                method: method.to_string(),
            }
            .into());
        }
        let config = self
            .manifest
            .cull_config()
            .with_native_sources(loaded.native_sources.clone());
        let report = cull(&mut loaded.table, &config).context("Reachability analysis failed")?;
        debug!(
            live = report.live_classes.len(),
            eliminated = report.eliminated_classes.len(),
            unresolved = report.unresolved.len(),
            "cull finished"
        );
        Ok(report)
    }

    /// Culls and lowers a loaded input. Native companion sources travel with the program.
    pub fn lower(&self, mut loaded: LoadedInput) -> Result<Lowered> {
        let report = self.cull_input(&mut loaded)?;
        let mut program =
            lower_program(&loaded.table, &report, self.entry()?).context("Lowering failed")?;
        program.native_sources = loaded.native_sources;
        Ok(Lowered {
            table: loaded.table,
            report,
            program,
            skipped: loaded.skipped,
        })
    }

    pub fn inspect(&self, input: &Path) -> Result<Inspection> {
        let mut loaded = self.load(input)?;
        let report = self.cull_input(&mut loaded)?;
        let classes = loaded
            .table
            .iter()
            .map(|(_, class)| ClassSummary {
                name: class.name.clone(),
                super_name: class.super_name.clone(),
                interface: class.is_interface(),
                live: !class.eliminated,
                methods: class.methods.len(),
                live_methods: class.live_methods().count(),
                fields: class.fields.len(),
            })
            .collect();
        Ok(Inspection {
            entry_class: self.manifest.entry_class.clone(),
            classes,
            report,
            native_sources: loaded.native_sources.into_iter().map(|s| s.path).collect(),
            skipped: loaded.skipped,
        })
    }

    /// Runs the whole pipeline. Nothing is written unless every stage, the linkage check
    /// included, succeeds.
    pub fn translate(&self, input: &Path, out_dir: &Path) -> Result<Translation> {
        let lowered = self.lower(self.load(input)?)?;
        let summary = emit_program(&lowered.program, out_dir, &self.emitter, &self.manifest)
            .with_context(|| format!("Failed to emit into {}", out_dir.display()))?;
        info!(
            input = %input.display(),
            entry = %summary.descriptor.entry_symbol,
            live_classes = lowered.report.live_classes.len(),
            eliminated_classes = lowered.report.eliminated_classes.len(),
            "translation finished"
        );
        Ok(Translation {
            report: lowered.report,
            summary,
            skipped: lowered.skipped,
        })
    }

    /// Loads the lowered program into the reference runtime instead of emitting it.
    pub fn executor(&self, input: &Path, config: RuntimeConfig) -> Result<Executor> {
        let lowered = self.lower(self.load(input)?)?;
        Ok(Executor::new(Program::new(lowered.program), config))
    }
}
