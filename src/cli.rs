use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ds389")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative 389 Directory Server provisioning", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile the manifest and print the catalog in evaluation order
    Compile(CompileArgs),

    /// Print the catalog's dependency graph as Graphviz DOT
    Graph(ManifestArgs),

    /// Show what apply would change, without changing anything
    Plan(ManifestArgs),

    /// Converge the host to the manifest
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
pub struct ManifestArgs {
    /// Manifest to compile (default: ~/.config/ds389/manifest.toml)
    #[arg(short, long, env = "DS389_MANIFEST")]
    pub manifest: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CompileArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Deadline in seconds for each external command
    #[arg(short, long, default_value = "300")]
    pub timeout: u64,
}
