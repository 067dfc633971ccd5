use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "brokerfacts",
    version,
    about = "Broker report fact extraction and CSV output tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Tables(TablesArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Broker report PDF to process.
    #[arg(long)]
    pub pdf_path: PathBuf,

    /// Restrict extraction to one table; all schema tables when omitted.
    #[arg(long)]
    pub table: Option<String>,

    /// Inclusive 1-based page subset, e.g. 1..4.
    #[arg(long)]
    pub pages: Option<String>,

    #[arg(long, default_value = "schema.sql")]
    pub schema_path: PathBuf,

    #[arg(long, default_value = "output_csvs")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "gemini-1.5-flash")]
    pub model_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct TablesArgs {
    #[arg(long, default_value = "schema.sql")]
    pub schema_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "schema.sql")]
    pub schema_path: PathBuf,

    #[arg(long, default_value = "output_csvs")]
    pub output_dir: PathBuf,
}
