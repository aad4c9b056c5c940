//! # pm - task dependencies and derived status
//!
//! Command-line front end for the `task_cascade` engine.
//!
//! ## Quick Start
//!
//! ```bash
//! pm feature add "User Management" --project capstone
//! pm function add "Registration" --feature 1
//! pm task add "Email validation" --function 1 --deadline "next friday"
//! pm task add "Signup form" --function 1 --start "in 8d" --deadline "in 14d"
//! pm dep add 2 1 --type FS --lag 1
//! pm task status 1 doing
//! pm list
//! ```
//!
//! Data is stored locally in `~/.pm/tasks.json`. Settings are read from
//! `~/.pm/config.json` (`strict`, `record_activity`, `default_actor`).
//! Set `RUST_LOG=debug` to see every engine decision.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::debug;

use task_cascade::config::EngineConfig;
use task_cascade::db::Database;
use task_cascade::error::{FixSuggestion, Result};

mod cli;
mod cmd;

use cli::Cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        if let Some(fix) = e.fix_suggestion() {
            eprintln!("  Fix: {fix}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = match cli.db {
        Some(path) => path,
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            let pm_dir = PathBuf::from(home).join(".pm");
            std::fs::create_dir_all(&pm_dir)?;
            pm_dir.join("tasks.json")
        }
    };
    let pm_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let config = EngineConfig::load(pm_dir)?;
    let actor = cli.actor.unwrap_or_else(|| config.default_actor.clone());
    debug!(db = %db_path.display(), %actor, "loading database");

    let mut db = Database::load(&db_path)?;
    let mutates = cli.command.mutates();
    cmd::run(&mut db, &config, &actor, cli.command)?;
    if mutates {
        db.save(&db_path)?;
    }
    Ok(())
}
