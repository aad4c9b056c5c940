use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed task dependency and status cascade CLI.
/// Storage defaults to ~/.pm/tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "pm", version, about = "Task dependencies and derived status tracking")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor recorded in the activity log.
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
