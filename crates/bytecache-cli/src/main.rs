use anyhow::{bail, Context};
use bytecache_core::header::{HeaderSummary, PatchRecipe};
use bytecache_core::{CliOverrides, EngineVersion, LoaderConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// bytecache - inspect and repair engine bytecode cache blobs
#[derive(Parser, Debug)]
#[command(name = "bytecache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode the header of a blob
    Inspect {
        #[arg(value_name = "BLOB")]
        blob: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy version-dependent header fields from a reference blob
    Patch {
        #[arg(value_name = "BLOB")]
        blob: PathBuf,

        /// Blob freshly compiled by the consuming engine
        #[arg(long, value_name = "FILE")]
        reference: PathBuf,

        /// Version of the consuming engine (e.g. v14.17.0)
        #[arg(long, value_name = "VERSION")]
        engine_version: String,

        /// Write the patched blob here instead of overwriting BLOB
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Path to a bytecache.json / bytecache.yaml configuration file
        #[arg(short, long, value_name = "FILE")]
        project: Option<PathBuf>,
    },

    /// Show which patch recipe applies to an engine version
    Recipe {
        #[arg(long, value_name = "VERSION")]
        engine_version: String,

        #[arg(short, long, value_name = "FILE")]
        project: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration after command-line overrides
    Config {
        #[arg(short, long, value_name = "FILE")]
        project: Option<PathBuf>,

        /// Suffix that marks an import as a bytecode blob
        #[arg(long, value_name = "EXT")]
        bytecode_extension: Option<String>,

        /// Lowest engine major version that gets --no-flush-bytecode
        #[arg(long, value_name = "MAJOR")]
        flush_bytecode_min_major: Option<u32>,

        /// Base directory for relative bytecode specifiers
        #[arg(long, value_name = "DIR")]
        root_dir: Option<String>,

        /// Do not minify bundled output
        #[arg(long)]
        no_minify: bool,
    },

    /// Write a default configuration file
    Init {
        #[arg(value_name = "FILE", default_value = "bytecache.yaml")]
        path: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectReport {
    #[serde(flatten)]
    header: HeaderSummary,
    placeholder_len: u32,
    blake3: String,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays machine-readable.
    // Set RUST_LOG=debug for detailed logs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { blob, json } => inspect(&blob, json),
        Command::Patch {
            blob,
            reference,
            engine_version,
            output,
            project,
        } => patch(
            &blob,
            &reference,
            &engine_version,
            output.as_deref(),
            project.as_deref(),
        ),
        Command::Recipe {
            engine_version,
            project,
            json,
        } => recipe(&engine_version, project.as_deref(), json),
        Command::Config {
            project,
            bytecode_extension,
            flush_bytecode_min_major,
            root_dir,
            no_minify,
        } => {
            let overrides = CliOverrides {
                bytecode_extension,
                flush_bytecode_min_major,
                root_dir,
                minify: no_minify.then_some(false),
            };
            show_config(project.as_deref(), &overrides)
        }
        Command::Init { path } => init(&path),
    }
}

fn load_config(project: Option<&Path>) -> anyhow::Result<LoaderConfig> {
    let path = match project {
        Some(path) => path.to_path_buf(),
        None => {
            let found = ["bytecache.yaml", "bytecache.yml", "bytecache.json"]
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists());
            match found {
                Some(path) => path,
                None => return Ok(LoaderConfig::default()),
            }
        }
    };
    debug!("Loading configuration from {}", path.display());
    LoaderConfig::from_file(&path)
        .with_context(|| format!("Failed to load config file {}", path.display()))
}

fn read_blob(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let blob = read_blob(path)?;
    let header = HeaderSummary::read(&blob)
        .with_context(|| format!("{} is not a bytecode blob", path.display()))?;
    let report = InspectReport {
        placeholder_len: header.placeholder_len(),
        blake3: blake3::hash(&blob).to_hex().to_string(),
        header,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("file:            {}", path.display());
    println!("size:            {} bytes", report.header.blob_len);
    println!("source length:   {}", report.header.source_length);
    println!("module:          {}", report.header.is_module);
    println!("placeholder len: {}", report.placeholder_len);
    println!("blake3:          {}", report.blake3);
    for (i, word) in report.header.words.iter().enumerate() {
        println!("  [{:>2}..{:>2}) {:#010x}", i * 4, i * 4 + 4, word);
    }
    Ok(())
}

fn patch(
    blob_path: &Path,
    reference_path: &Path,
    engine_version: &str,
    output: Option<&Path>,
    project: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(project)?;
    let version = EngineVersion::parse(engine_version)?;
    let mut blob = read_blob(blob_path)?;
    let reference = read_blob(reference_path)?;

    let table = config.patch_table();
    let Some(recipe) = table.patch(&mut blob, &reference, &version) else {
        warn!(version = %version, "no header patch recipe for engine version");
        bail!("No patch recipe matches engine version {}", version);
    };

    let output = output.unwrap_or(blob_path);
    std::fs::write(output, &blob)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(recipe = %recipe.name, output = %output.display(), "patched blob");
    println!("Patched {} using recipe '{}'", output.display(), recipe.name);
    Ok(())
}

fn recipe(engine_version: &str, project: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(project)?;
    let version = EngineVersion::parse(engine_version)?;
    let table = config.patch_table();

    let selected: Option<&PatchRecipe> = table.select(&version);
    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    match selected {
        Some(recipe) => {
            println!("{} -> {}", version, recipe.name);
            for range in &recipe.ranges {
                println!("  [{}, {})", range.start, range.end);
            }
        }
        None => println!("{} -> no recipe (blob left unpatched)", version),
    }
    Ok(())
}

fn show_config(project: Option<&Path>, overrides: &CliOverrides) -> anyhow::Result<()> {
    let mut config = load_config(project)?;
    config.merge(overrides);
    debug!("Effective configuration: {:?}", config);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    LoaderConfig::init_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
