use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "classport")]
#[command(about = "classport - ahead-of-time translation of classfile bytecode to standalone C")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a classfile directory into C translation units
    Translate {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Entry class, overriding the manifest (`app.Main` or `app/Main`)
        #[arg(long)]
        entry: Option<String>,

        /// Display name recorded in the build descriptor
        #[arg(long)]
        name: Option<String>,

        /// Emit every class into a single source file
        #[arg(long)]
        concatenate: bool,

        /// Prefix emitted statements with their bytecode offset
        #[arg(long)]
        line_comments: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Load and cull a classfile directory, reporting what survives
    Inspect {
        input: PathBuf,

        #[arg(long)]
        manifest: Option<PathBuf>,

        #[arg(long)]
        entry: Option<String>,

        /// Print why a node is live (e.g. `app/Util` or `app/Util.helper()I`)
        #[arg(long)]
        explain: Vec<String>,

        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "warn,classport=debug"
    } else {
        "warn,classport=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_pipeline(
    manifest: Option<PathBuf>,
    entry: Option<String>,
) -> Result<classport::TranslationPipeline> {
    use classport::{BuildManifest, TranslationPipeline};

    let mut pipeline = match manifest {
        Some(path) => TranslationPipeline::from_manifest_file(&path)?,
        None => TranslationPipeline::new(BuildManifest::default()),
    };
    if let Some(entry) = entry {
        pipeline = pipeline.with_entry(&entry);
    }
    Ok(pipeline)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Translate {
            input,
            output,
            manifest,
            entry,
            name,
            concatenate,
            line_comments,
            verbose,
        } => {
            init_logging(verbose);
            cmd_translate(
                input,
                output,
                manifest,
                entry,
                name,
                concatenate,
                line_comments,
                verbose,
            )
        }
        Commands::Inspect {
            input,
            manifest,
            entry,
            explain,
            json,
            verbose,
        } => {
            init_logging(verbose);
            cmd_inspect(input, manifest, entry, explain, json, verbose)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_translate(
    input: PathBuf,
    output: PathBuf,
    manifest: Option<PathBuf>,
    entry: Option<String>,
    name: Option<String>,
    concatenate: bool,
    line_comments: bool,
    verbose: bool,
) -> Result<()> {
    use classport::EmitterConfig;
    use colored::*;
    use std::time::Instant;

    let mut pipeline = build_pipeline(manifest, entry)?;
    if let Some(name) = name {
        pipeline = pipeline.with_display_name(&name);
    }
    let config = EmitterConfig {
        concatenate,
        line_comments,
        ..pipeline.emitter_config().clone()
    };
    let pipeline = pipeline.with_emitter_config(config);

    if verbose {
        println!("{}", " classport translate".bright_blue().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!(" Input: {}", input.display());
        println!(" Output: {}", output.display());
        println!(" Entry: {}", pipeline.manifest().entry_class);
        println!();
    }

    let start = Instant::now();
    let translation = pipeline.translate(&input, &output)?;
    let summary = &translation.summary;

    if verbose {
        for file in &summary.descriptor.files {
            println!(
                "   {:<40} {:>8} bytes  {}",
                file.path,
                file.bytes,
                &file.sha256[..12]
            );
        }
        if !translation.skipped.is_empty() {
            println!(
                "{}",
                format!("   {} file(s) skipped", translation.skipped.len()).yellow()
            );
        }
        println!();
    }

    println!(
        " {} {} classes, {} methods ({} classes eliminated) in {:.3}s",
        "SUCCESS:".bright_green().bold(),
        summary.classes,
        summary.methods,
        translation.report.eliminated_classes.len(),
        start.elapsed().as_secs_f64()
    );
    println!("   Output: {}", summary.out_dir.display());
    println!("   Descriptor: {}", summary.descriptor_path.display());

    Ok(())
}

fn cmd_inspect(
    input: PathBuf,
    manifest: Option<PathBuf>,
    entry: Option<String>,
    explain: Vec<String>,
    json: bool,
    verbose: bool,
) -> Result<()> {
    use colored::*;

    let pipeline = build_pipeline(manifest, entry)?;
    let inspection = pipeline.inspect(&input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(" {} class(es) in {}", inspection.classes.len(), input.display())
            .bright_cyan()
            .bold()
    );
    println!("{}", "=".repeat(60).bright_cyan());
    for class in &inspection.classes {
        if !class.live && !verbose {
            continue;
        }
        let status = if class.live {
            "live".bright_green()
        } else {
            "eliminated".bright_red()
        };
        let kind = if class.interface { " (interface)" } else { "" };
        println!(
            " {:<40} {:<10} methods {}/{}  fields {}{}",
            class.name, status, class.live_methods, class.methods, class.fields, kind
        );
    }

    let report = &inspection.report;
    println!();
    println!("{}", " Cull summary".bright_yellow().bold());
    println!(
        "   Classes: {} live, {} eliminated",
        report.live_classes.len(),
        report.eliminated_classes.len()
    );
    println!(
        "   Methods: {} live, {} eliminated",
        report.live_methods, report.eliminated_methods
    );
    println!(
        "   Fields: {} live, {} eliminated",
        report.live_fields, report.eliminated_fields
    );
    println!("   Effectively final: {}", report.effectively_final.len());
    println!(
        "   Graph: {} nodes, {} edges ({:.3}s)",
        report.graph_nodes,
        report.graph_edges,
        report.duration.as_secs_f64()
    );
    if !inspection.native_sources.is_empty() {
        println!("   Native sources: {}", inspection.native_sources.len());
    }
    if !report.unresolved.is_empty() {
        println!(
            "{}",
            format!("   Unresolved references: {}", report.unresolved.len()).yellow()
        );
        if verbose {
            for (from, missing) in &report.unresolved {
                println!("     {} -> {}", from, missing);
            }
        }
    }

    for label in &explain {
        println!();
        match report.explain(label) {
            Some(chain) => {
                println!("{}", format!(" Why {} is live:", label).bright_green());
                for step in chain {
                    println!("   {}", step);
                }
            }
            None => println!("{}", format!(" {} is not live", label).bright_red()),
        }
    }

    Ok(())
}
