use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "capsort",
    version,
    about = "Capacity-model sqlite ordering and validation tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Sort(SortArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "input_sqlite")]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub db_filter: Option<String>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SortArgs {
    #[arg(long, default_value = "input_sqlite")]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "output_sqlite")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "manifests")]
    pub manifest_dir: PathBuf,

    #[arg(long)]
    pub db_filter: Option<String>,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub validation_report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "output_sqlite")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "manifests")]
    pub manifest_dir: PathBuf,
}
