use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use schemars::{Schema, schema_for};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for gpdload")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Document {
    Run,
    Load,
    Config,
    PaymentPositions,
    Iupds,
}

impl Document {
    const ALL: [Document; 5] = [
        Document::Run,
        Document::Load,
        Document::Config,
        Document::PaymentPositions,
        Document::Iupds,
    ];

    fn file_name(self) -> &'static str {
        match self {
            Document::Run => "gpdload.run.v1.schema.json",
            Document::Load => "gpdload.load.v1.schema.json",
            Document::Config => "gpdload.config.v1.schema.json",
            Document::PaymentPositions => "gpd.payment-positions.schema.json",
            Document::Iupds => "gpd.iupds.schema.json",
        }
    }

    fn schema(self) -> Schema {
        match self {
            Document::Run => schema_for!(gpdload_types::RunReceipt),
            Document::Load => schema_for!(gpdload_types::LoadReceipt),
            Document::Config => schema_for!(gpdload_types::ConfigFile),
            Document::PaymentPositions => schema_for!(gpdload_types::PaymentPositionBatch),
            Document::Iupds => schema_for!(gpdload_types::IupdBatch),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for receipts, config and upload documents.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },

    /// Check a JSON file (receipt, fixture, config as JSON) against its schema.
    Validate {
        #[arg(long, value_enum)]
        kind: Document,

        file: PathBuf,
    },

    /// Run the usual repo checks (fmt, clippy, test, schema).
    Ci,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir } => cmd_schema(&out_dir),
        Command::Validate { kind, file } => cmd_validate(kind, &file),
        Command::Ci => cmd_ci(),
    }
}

fn cmd_ci() -> anyhow::Result<()> {
    run("cargo", ["fmt", "--all", "--", "--check"])?;
    run(
        "cargo",
        ["clippy", "--all-targets", "--all-features", "--", "-D", "warnings"],
    )?;
    run("cargo", ["test", "--all"])?;
    run("cargo", ["run", "-p", "xtask", "--", "schema"])?;
    Ok(())
}

fn run<const N: usize>(bin: &str, args: [&str; N]) -> anyhow::Result<()> {
    let status = std::process::Command::new(bin)
        .args(args)
        .status()
        .with_context(|| format!("running {bin}"))?;
    if !status.success() {
        anyhow::bail!("{bin} failed: {status}");
    }
    Ok(())
}

fn cmd_schema(out_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;
    for doc in Document::ALL {
        write_schema(out_dir, doc.file_name(), doc.schema())?;
    }
    Ok(())
}

fn cmd_validate(kind: Document, file: &Path) -> anyhow::Result<()> {
    let schema = serde_json::to_value(kind.schema())?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("invalid schema for {kind:?}: {e}"))?;

    let content =
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let instance: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("parse {}", file.display()))?;

    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("{}: {e}", e.instance_path))
        .collect();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        anyhow::bail!("{} does not match {}", file.display(), kind.file_name());
    }
    println!("{} ok", file.display());
    Ok(())
}

fn write_schema<T: serde::Serialize>(out_dir: &Path, name: &str, schema: T) -> anyhow::Result<()> {
    let path = out_dir.join(name);
    let json = serde_json::to_vec_pretty(&schema)?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
