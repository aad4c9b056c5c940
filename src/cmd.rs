//! Command implementations for the CLI interface.
//!
//! Each handler works on an already loaded `Database`; `main` saves it after
//! any command that mutates it.

use std::collections::BTreeMap;
use std::io;

use chrono::{Local, TimeZone, Utc};
use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::json;

use task_cascade::cascade::{CascadeCoordinator, CascadeReport, LevelOutcome, TaskStatusService};
use task_cascade::config::EngineConfig;
use task_cascade::constraint::Violation;
use task_cascade::db::*;
use task_cascade::dependency::{DependencyService, RawDependency};
use task_cascade::error::{Error, FixSuggestion, Result};
use task_cascade::fields::*;
use task_cascade::task::{DependencyEdge, NewTask, TaskId};

use crate::cli::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Manage features.
    Feature {
        #[command(subcommand)]
        action: FeatureAction,
    },

    /// Manage functions.
    Function {
        #[command(subcommand)]
        action: FunctionAction,
    },

    /// Manage tasks and their status.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage dependencies between tasks.
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },

    /// Show features, functions and tasks with their statuses.
    List,

    /// Show recent activity.
    Activity {
        /// Number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only entries about this task.
        #[arg(long)]
        task: Option<TaskId>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Whether the command changes the database.
    pub fn mutates(&self) -> bool {
        match self {
            Commands::Feature { .. } | Commands::Function { .. } => true,
            Commands::Task { action } => !matches!(action, TaskAction::View { .. }),
            Commands::Dep { action } => matches!(action, DepAction::Add { .. } | DepAction::Rm { .. }),
            Commands::List | Commands::Activity { .. } | Commands::Completions { .. } => false,
        }
    }
}

#[derive(Subcommand)]
pub enum FeatureAction {
    /// Add a feature.
    Add {
        name: String,
        /// Project the feature belongs to.
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum FunctionAction {
    /// Add a function under a feature.
    Add {
        name: String,
        /// Owning feature ID.
        #[arg(long)]
        feature: u64,
    },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task under a function.
    Add {
        title: String,
        /// Owning function ID.
        #[arg(long)]
        function: u64,
        /// Deadline: YYYY-MM-DD, "today", "tomorrow", "in Nd", "next friday".
        #[arg(long)]
        deadline: String,
        /// Start date, same formats as the deadline.
        #[arg(long)]
        start: Option<String>,
        /// Estimated work units.
        #[arg(long, default_value_t = 0.0)]
        estimate: f64,
        /// Status: todo | doing | done.
        #[arg(long, value_enum, default_value_t = Status::ToDo)]
        status: Status,
    },

    /// Change a task's status and recompute its function and feature.
    Status {
        id: TaskId,
        #[arg(value_enum)]
        status: Status,
    },

    /// Delete a task together with its dependencies.
    Delete { id: TaskId },

    /// View a task with its dependencies.
    View { id: TaskId },
}

#[derive(Subcommand)]
pub enum DepAction {
    /// Make TASK depend on DEPENDS_ON.
    Add {
        task: TaskId,
        depends_on: String,
        /// FS | FF | SS | SF | relates_to (default FS).
        #[arg(long = "type")]
        dependency_type: Option<String>,
        /// Lag in days; negative for lead time.
        #[arg(long, allow_hyphen_values = true)]
        lag: Option<String>,
        /// true | false (default true).
        #[arg(long)]
        mandatory: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Reject the dependency if dates or statuses are inconsistent.
        #[arg(long)]
        strict: bool,
    },

    /// Remove a dependency by its ID.
    Rm { edge_id: u64 },

    /// List dependencies of a task in both directions.
    List { task: TaskId },

    /// Re-check every dependency around a task against current dates and statuses.
    Check { task: TaskId },

    /// Print tasks in dependency order.
    Order,
}

/// Run a command against the loaded database.
pub fn run(db: &mut Database, config: &EngineConfig, actor: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Feature { action: FeatureAction::Add { name, project } } => {
            let id = db.add_feature(&name, project)?;
            println!("Added feature {id}");
            Ok(())
        }
        Commands::Function { action: FunctionAction::Add { name, feature } } => {
            let id = db.add_function(&name, feature)?;
            let report = CascadeCoordinator::new(db, config.clone()).on_function_status_changed(id, actor);
            println!("Added function {id}");
            print_cascade(&report);
            Ok(())
        }
        Commands::Task { action } => cmd_task(db, config, actor, action),
        Commands::Dep { action } => cmd_dep(db, config, actor, action),
        Commands::List => {
            cmd_list(db);
            Ok(())
        }
        Commands::Activity { limit, task } => {
            cmd_activity(db, limit, task);
            Ok(())
        }
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "pm", &mut io::stdout());
            Ok(())
        }
    }
}

fn parse_date_arg(field: &'static str, input: &str) -> Result<chrono::NaiveDate> {
    parse_date_input(input).ok_or_else(|| Error::invalid(field, format!("cannot understand date '{input}'")))
}

fn cmd_task(db: &mut Database, config: &EngineConfig, actor: &str, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Add { title, function, deadline, start, estimate, status } => {
            let deadline = parse_date_arg("deadline", &deadline)?;
            let start_date = start.as_deref().map(|s| parse_date_arg("start_date", s)).transpose()?;
            let id = db.add_task(NewTask { title, function_id: function, deadline, start_date, estimate, status })?;
            let report = CascadeCoordinator::new(db, config.clone()).on_task_status_changed(id, actor)?;
            println!("Added task {id}");
            print_cascade(&report);
        }
        TaskAction::Status { id, status } => {
            let change = TaskStatusService::new(db, config.clone()).change_task_status(id, status, actor)?;
            if change.previous == status {
                println!("Task {id} already {status}");
            } else {
                println!("Task {id}: {} -> {status}", change.previous);
            }
            print_cascade(&change.cascade);
        }
        TaskAction::Delete { id } => {
            let report = TaskStatusService::new(db, config.clone()).delete_task(id, actor)?;
            println!("Deleted task {id}");
            print_cascade(&report);
        }
        TaskAction::View { id } => {
            let task = db.task(id).cloned().ok_or_else(|| Error::task_not_found(id))?;
            let today = Local::now().date_naive();
            let function = db.function(task.function_id);
            println!("ID:           {}", task.id);
            println!("Title:        {}", task.title);
            println!("Status:       {}", task.status);
            println!(
                "Function:     {}",
                function.map(|f| format!("{} (#{}, {})", f.name, f.id, f.status)).unwrap_or_else(|| "-".into())
            );
            println!("Start:        {}", task.start_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()));
            println!(
                "Deadline:     {}",
                match task.deadline {
                    Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
                    None => "-".into(),
                }
            );
            println!("Estimate:     {}", task.estimate);
            println!("Actual:       {}", task.actual);
            println!("Updated UTC:  {}", format_timestamp(task.updated_at_utc));

            let deps = DependencyService::new(db, config.clone()).dependencies_for(id)?;
            println!("Depends on:");
            print_edges(&deps.depends_on, |e| e.depends_on_task_id);
            println!("Required by:");
            print_edges(&deps.dependents, |e| e.task_id);
        }
    }
    Ok(())
}

fn cmd_dep(db: &mut Database, config: &EngineConfig, actor: &str, action: DepAction) -> Result<()> {
    match action {
        DepAction::Add { task, depends_on, dependency_type, lag, mandatory, notes, strict } => {
            let request = RawDependency {
                depends_on_task_id: Some(json!(depends_on)),
                dependency_type: dependency_type.map(|t| json!(t)),
                lag_days: lag.map(|l| json!(l)),
                is_mandatory: mandatory.map(|m| json!(m)),
                notes,
                strict: strict.then_some(true),
            };
            let outcome = DependencyService::new(db, config.clone()).add_dependency(task, &request, actor)?;
            let edge = outcome.edge;
            println!(
                "Added dependency {}: task {} {} task {}{}",
                edge.id,
                edge.task_id,
                edge.dependency_type,
                edge.depends_on_task_id,
                format_lag(edge.lag_days)
            );
            print_violations(&outcome.violations);
        }
        DepAction::Rm { edge_id } => {
            let edge = DependencyService::new(db, config.clone()).remove_dependency(edge_id, actor)?;
            println!("Removed dependency {} (task {} -> task {})", edge.id, edge.task_id, edge.depends_on_task_id);
        }
        DepAction::List { task } => {
            let deps = DependencyService::new(db, config.clone()).dependencies_for(task)?;
            println!("Task {task} depends on:");
            print_edges(&deps.depends_on, |e| e.depends_on_task_id);
            println!("Required by:");
            print_edges(&deps.dependents, |e| e.task_id);
        }
        DepAction::Check { task } => {
            let violations = DependencyService::new(db, config.clone()).check_task(task)?;
            if violations.is_empty() {
                println!("All dependencies of task {task} are consistent.");
            } else {
                print_violations(&violations);
            }
        }
        DepAction::Order => {
            let graph = db.graph();
            let order = graph.topological_order()?;
            if order.is_empty() {
                println!("No precedence dependencies.");
                return Ok(());
            }
            println!("{} tasks, {} precedence dependencies", graph.task_count(), graph.edge_count());
            for (i, id) in order.iter().enumerate() {
                let title = db.task(*id).map(|t| t.title.as_str()).unwrap_or("?");
                println!("{:>3}. #{:<5} {}", i + 1, id, truncate(title, 40));
                let after = graph.predecessors(*id);
                if !after.is_empty() {
                    println!("       after {}", join_ids(&after));
                }
                let blocks = graph.successors(*id);
                if !blocks.is_empty() {
                    println!("       before {}", join_ids(&blocks));
                }
            }
        }
    }
    Ok(())
}

/// Print the feature tree with statuses.
pub fn cmd_list(db: &Database) {
    let today = Local::now().date_naive();
    let mut tasks_by_function: BTreeMap<u64, Vec<_>> = BTreeMap::new();
    for t in &db.tasks {
        tasks_by_function.entry(t.function_id).or_default().push(t);
    }

    if db.features.is_empty() {
        println!("No features yet. Start with `pm feature add <name>`.");
        return;
    }
    for feature in &db.features {
        let project = feature.project.as_deref().map(|p| format!(" ({p})")).unwrap_or_default();
        println!("Feature {} {} [{}]{}", feature.id, feature.name, feature.status, project);
        for function in db.functions.iter().filter(|f| f.feature_id == feature.id) {
            println!("  Function {} {} [{}]", function.id, function.name, function.status);
            for t in tasks_by_function.get(&function.id).into_iter().flatten() {
                println!(
                    "    #{:<5} {:<6} {:<10} {}",
                    t.id,
                    t.status,
                    format_due_relative(t.deadline, today),
                    truncate(&t.title, 48)
                );
            }
        }
    }
    let orphans = orphan_tasks(db);
    if !orphans.is_empty() {
        println!("Tasks without a function: {:?}", orphans);
    }
}

/// Print the most recent activity entries, oldest first.
pub fn cmd_activity(db: &Database, limit: usize, task: Option<TaskId>) {
    let entries: Vec<_> = db
        .activity
        .iter()
        .filter(|e| task.map_or(true, |id| e.entity_type == EntityKind::Task && e.entity_id == id))
        .collect();
    let skip = entries.len().saturating_sub(limit);
    for e in entries.into_iter().skip(skip) {
        println!(
            "{}  {:<8} {:<8} {:<5} {:<18} {}",
            format_timestamp(e.at_utc),
            truncate(&e.actor_id, 8),
            e.entity_type,
            e.entity_id,
            e.action,
            e.metadata
        );
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ")
}

fn format_lag(lag_days: i64) -> String {
    match lag_days {
        0 => String::new(),
        n if n > 0 => format!(" (+{n}d)"),
        n => format!(" ({n}d)"),
    }
}

fn print_edges(edges: &[DependencyEdge], other_end: impl Fn(&DependencyEdge) -> TaskId) {
    if edges.is_empty() {
        println!("  -");
    }
    for e in edges {
        let mandatory = if e.is_mandatory { "" } else { " optional" };
        let notes = e.notes.as_deref().map(|n| format!(" - {n}")).unwrap_or_default();
        println!(
            "  [{}] {} task {}{}{}{}",
            e.id,
            e.dependency_type,
            other_end(e),
            format_lag(e.lag_days),
            mandatory,
            notes
        );
    }
}

fn print_violations(violations: &[Violation]) {
    for v in violations {
        let label = match v.severity {
            Severity::Warning => "warning",
            Severity::Info => "note",
        };
        println!("{label}: {}", v.message);
        if let Some(s) = &v.suggestion {
            println!("  fix: {s}");
        }
    }
}

fn print_cascade(report: &CascadeReport) {
    for level in report.function.iter().chain(report.feature.iter()) {
        if let LevelOutcome::Changed { from, to } = &level.outcome {
            println!("  {} {}: {from} -> {to}", level.kind, level.id);
        }
    }
    for d in &report.degraded {
        eprintln!("  degraded: {d}");
        if let Some(fix) = d.fix_suggestion() {
            eprintln!("  fix: {fix}");
        }
    }
}
