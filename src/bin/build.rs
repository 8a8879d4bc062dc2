//! Specification Build CLI
//!
//! Builds the specification database from the configured sources and
//! inspects previously written snapshots.

use anyhow::Context;
use clap::{Parser, Subcommand};
use service_spec::{spec_database, Snapshot, SpecBuilder, SpecConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spec-build")]
#[command(about = "Build and inspect the resource specification database")]
struct Cli {
    /// Configuration file, layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the database snapshot and problem report
    Build {
        /// Directory of registry resource schemas
        #[arg(long)]
        registry_dir: Option<PathBuf>,
        /// Legacy specification document
        #[arg(long)]
        legacy_spec: Option<PathBuf>,
        /// Documentation document
        #[arg(long)]
        documentation: Option<PathBuf>,
        /// Snapshot output file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Problem report output file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Import resources even if their schema does not validate
        #[arg(long)]
        no_validate: bool,
        /// Write compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Print entity and edge counts of a snapshot
    Summary {
        /// Snapshot file
        snapshot: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            registry_dir,
            legacy_spec,
            documentation,
            output,
            report,
            no_validate,
            compact,
        } => {
            let mut config = SpecConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
            if let Some(dir) = registry_dir {
                config.sources.registry_dir = dir;
            }
            if legacy_spec.is_some() {
                config.sources.legacy_spec = legacy_spec;
            }
            if documentation.is_some() {
                config.sources.documentation = documentation;
            }
            if let Some(path) = output {
                config.output.path = path;
            }
            if let Some(path) = report {
                config.output.report_path = path;
            }
            if no_validate {
                config.validation.must_validate = false;
            }
            if compact {
                config.output.format = service_spec::config::OutputFormat::Compact;
            }

            let result = SpecBuilder::new(config.clone()).build_and_write()?;

            println!("📦 Imported {} resource types", result.imported.len());
            for problem in result.report.failures() {
                println!("   ❌ {}", problem);
            }
            println!("   {}", result.summary);
            println!("   snapshot: {}", config.output.path.display());
            println!("   report:   {}", config.output.report_path.display());
        }

        Commands::Summary { snapshot } => {
            let snapshot = Snapshot::read_from(&snapshot)?;
            let mut db = spec_database();
            db.load(&snapshot)?;

            println!("📊 Snapshot format {}", snapshot.format_version);
            println!("   checksum: {}", snapshot.checksum);
            let collections: Vec<String> = db.collection_names().map(String::from).collect();
            for name in collections {
                println!("   {:<16} {:>6} entities", name, db.len(&name)?);
            }
            let relations: Vec<String> = db.relation_names().map(String::from).collect();
            for name in relations {
                println!("   {:<16} {:>6} edges", name, db.relation(&name)?.len());
            }
        }
    }

    Ok(())
}
